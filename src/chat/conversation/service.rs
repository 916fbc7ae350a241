//! 活跃会话控制器
//!
//! 一致性策略：本地先乐观更新，后端调用成功后整体重新拉取历史和统计，
//! 以拉取结果为准（不做增量合并）。每次拉取都带着发起时的会话 ID，
//! 响应到达时会话已切换则直接丢弃。

use crate::chat::backend::ChatBackend;
use crate::chat::bus::NotificationBus;
use crate::chat::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::chat::conversation::models::{
    ActiveContext, ChatMessage, ControllerPhase, SendOutcome,
};
use crate::chat::error::FailureKind;
use crate::chat::persona::DEFAULT_PERSONA;
use crate::chat::preference::SessionPreferences;
use crate::chat::types::ChatTurnReq;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct ControllerState {
    phase: ControllerPhase,
    context: ActiveContext,
    busy: bool,
    /// 没有可用会话（初始化或删除后新建失败），下一次用户操作时重试新建
    needs_session: bool,
}

/// 活跃会话控制器
///
/// 独占活跃上下文；会话列表归 `SessionDirectory` 所有，两者只通过
/// `NotificationBus` 和本地偏好间接联系。
pub struct ConversationController {
    backend: Arc<dyn ChatBackend>,
    preferences: SessionPreferences,
    bus: NotificationBus,
    listener: Arc<dyn ConversationListener>,
    default_persona: String,
    state: Mutex<ControllerState>,
    /// 活跃会话 ID 的变化通知，观察任务据此拉取历史和统计
    active_tx: watch::Sender<Option<String>>,
}

impl ConversationController {
    /// 创建控制器（使用默认空监听器）
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        preferences: SessionPreferences,
        bus: NotificationBus,
    ) -> Self {
        Self::with_listener(
            backend,
            preferences,
            bus,
            Arc::new(EmptyConversationListener),
        )
    }

    /// 创建控制器（带自定义监听器）
    pub fn with_listener(
        backend: Arc<dyn ChatBackend>,
        preferences: SessionPreferences,
        bus: NotificationBus,
        listener: Arc<dyn ConversationListener>,
    ) -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            backend,
            preferences,
            bus,
            listener,
            default_persona: DEFAULT_PERSONA.to_string(),
            state: Mutex::new(ControllerState {
                phase: ControllerPhase::Uninitialized,
                context: ActiveContext::default(),
                busy: false,
                needs_session: false,
            }),
            active_tx,
        }
    }

    /// 没有持久化人设时使用的人设
    pub fn with_default_persona(mut self, persona: impl Into<String>) -> Self {
        self.default_persona = persona.into();
        self.state
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .context
            .persona = self.default_persona.clone();
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> ControllerPhase {
        self.lock_state().phase.clone()
    }

    pub fn active_session_id(&self) -> Option<String> {
        self.lock_state().context.session_id.clone()
    }

    pub fn persona(&self) -> String {
        self.lock_state().context.persona.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock_state().context.messages.clone()
    }

    pub fn message_count(&self) -> u64 {
        self.lock_state().context.message_count
    }

    pub fn is_busy(&self) -> bool {
        self.lock_state().busy
    }

    /// 是否在等待重新新建会话
    pub fn needs_session(&self) -> bool {
        self.lock_state().needs_session
    }

    /// 活跃上下文快照
    pub fn context(&self) -> ActiveContext {
        self.lock_state().context.clone()
    }

    /// 订阅活跃会话 ID 的变化
    pub fn watch_active_session(&self) -> watch::Receiver<Option<String>> {
        self.active_tx.subscribe()
    }

    /// 启动观察任务：活跃会话变化时拉取历史和统计
    ///
    /// 任务只持有弱引用，控制器销毁后自动退出。
    pub fn spawn_active_session_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut rx = self.active_tx.subscribe();
        tokio::spawn(async move {
            // 订阅之前已经激活的会话也要拉取一次
            let mut pending = rx.borrow_and_update().clone();
            loop {
                if let Some(session_id) = pending.take() {
                    let Some(controller) = weak.upgrade() else {
                        break;
                    };
                    controller.on_active_session_changed(&session_id).await;
                }
                if rx.changed().await.is_err() {
                    debug!("[ConvCtl] 控制器已销毁，观察任务退出");
                    break;
                }
                pending = rx.borrow_and_update().clone();
            }
        })
    }

    /// 初始化：读取持久化的会话 ID 和人设
    ///
    /// 没有会话 ID 时先新建会话再返回；有会话 ID 时直接激活，是否存在留到第一次
    /// 拉取时再说。每个进程只初始化一次，重复调用直接返回当前会话 ID。
    pub async fn initialize(&self) -> Option<String> {
        {
            let mut state = self.lock_state();
            if state.phase != ControllerPhase::Uninitialized {
                warn!("[ConvCtl] 重复初始化，忽略");
                return state.context.session_id.clone();
            }
            state.phase = ControllerPhase::Initializing;
        }

        let prefs = self.preferences.load().await;
        let persona = prefs
            .last_persona
            .unwrap_or_else(|| self.default_persona.clone());
        self.lock_state().context.persona = persona.clone();

        match prefs.last_session_id {
            Some(session_id) => {
                info!(
                    "[ConvCtl] 🔁 恢复上次会话，会话ID: {}, 人设: {}",
                    session_id, persona
                );
                self.activate(&session_id, &persona).await;
                Some(session_id)
            }
            None => {
                info!("[ConvCtl] 🆕 没有上次会话，新建会话，人设: {}", persona);
                let created = self.create_session(None, Some(&persona)).await;
                if created.is_none() {
                    error!("[ConvCtl] 初始化时新建会话失败，等待下一次用户操作重试");
                }
                created
            }
        }
    }

    /// 切换活跃会话；`session_id` 为 None 时新建会话
    ///
    /// 本身不拉取历史，拉取由活跃会话变化触发。
    pub async fn switch_to(&self, session_id: Option<&str>, persona: &str) -> Option<String> {
        match session_id {
            None => self.create_session(None, Some(persona)).await,
            Some(session_id) => {
                info!(
                    "[ConvCtl] 🔀 切换会话，会话ID: {}, 人设: {}",
                    session_id, persona
                );
                self.preferences
                    .save_active_session(session_id, persona)
                    .await;
                self.activate(session_id, persona).await;
                Some(session_id.to_string())
            }
        }
    }

    /// 新建会话并设为活跃；失败时状态不变，返回 None
    pub async fn create_session(&self, title: Option<&str>, persona: Option<&str>) -> Option<String> {
        let persona = persona
            .map(str::to_string)
            .unwrap_or_else(|| self.persona());

        match self.backend.create_session(title, &persona).await {
            Ok(resp) => {
                info!(
                    "[ConvCtl] ✅ 新建会话，会话ID: {}, 人设: {}",
                    resp.session_id, persona
                );
                self.preferences
                    .save_active_session(&resp.session_id, &persona)
                    .await;
                self.activate(&resp.session_id, &persona).await;
                Some(resp.session_id)
            }
            Err(e) => {
                error!("[ConvCtl] 新建会话失败: {:?}", e);
                let mut state = self.lock_state();
                if state.context.session_id.is_none() {
                    state.needs_session = true;
                }
                None
            }
        }
    }

    /// 没有可用会话时新建一个，否则返回当前会话 ID
    pub async fn ensure_active_session(&self) -> Option<String> {
        let (needs_session, current) = {
            let state = self.lock_state();
            (state.needs_session, state.context.session_id.clone())
        };
        if !needs_session && current.is_some() {
            return current;
        }
        info!("[ConvCtl] 🔁 重试新建会话");
        self.create_session(None, None).await
    }

    /// 切换人设：持久化人设，并用新人设新建会话
    pub async fn change_persona(&self, persona: &str) -> Option<String> {
        info!("[ConvCtl] 🎭 切换人设: {}", persona);
        self.preferences.save_persona(persona).await;
        self.lock_state().context.persona = persona.to_string();
        self.create_session(None, Some(persona)).await
    }

    /// 活跃会话变化的响应：拉取历史和统计（两者互不依赖）
    pub async fn on_active_session_changed(&self, session_id: &str) {
        debug!("[ConvCtl] 活跃会话变化，拉取历史和统计: {}", session_id);
        tokio::join!(self.fetch_history(session_id), self.fetch_stats(session_id));
    }

    /// 拉取权威历史并整体替换消息列表；会话已切换时丢弃响应
    pub async fn fetch_history(&self, session_id: &str) -> bool {
        let rows = match self.backend.get_history(session_id).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("[ConvCtl] 拉取历史失败，会话ID: {}, 错误: {:?}", session_id, e);
                return false;
            }
        };
        let messages: Vec<ChatMessage> = rows
            .into_iter()
            .filter_map(ChatMessage::from_history)
            .collect();

        let applied = {
            let mut state = self.lock_state();
            if state.context.session_id.as_deref() == Some(session_id) {
                state.context.message_count = messages.len() as u64;
                state.context.messages = messages.clone();
                true
            } else {
                false
            }
        };
        if !applied {
            debug!("[ConvCtl] 丢弃过期的历史响应，会话ID: {}", session_id);
            return false;
        }

        debug!(
            "[ConvCtl] 历史已同步，会话ID: {}, 条数: {}",
            session_id,
            messages.len()
        );
        self.listener
            .on_messages_changed(session_id.to_string(), messages)
            .await;
        true
    }

    /// 拉取后端统计；会话已切换时丢弃响应
    ///
    /// 统计包含不进入对话记录的行，只记录为 `backend_total`，消息数仍以历史为准。
    pub async fn fetch_stats(&self, session_id: &str) -> bool {
        let stats = match self.backend.get_stats(session_id).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("[ConvCtl] 拉取统计失败，会话ID: {}, 错误: {:?}", session_id, e);
                return false;
            }
        };

        let mut state = self.lock_state();
        if state.context.session_id.as_deref() != Some(session_id) {
            debug!("[ConvCtl] 丢弃过期的统计响应，会话ID: {}", session_id);
            return false;
        }
        state.context.backend_total = stats.total_messages;
        if stats.total_messages != state.context.message_count {
            debug!(
                "[ConvCtl] 后端统计 {} 行，对话消息 {} 条，会话ID: {}",
                stats.total_messages, state.context.message_count, session_id
            );
        }
        true
    }

    /// 发送一条消息
    ///
    /// 先乐观追加用户消息，发送成功后以重新拉取的历史为准；失败时把归类后的
    /// 错误提示作为助手消息追加到对话记录，不自动重试。忙碌标志总会被清除。
    pub async fn send_message(&self, text: &str, persona: Option<&str>) -> SendOutcome {
        if text.trim().is_empty() {
            debug!("[ConvCtl] 空消息，忽略");
            return SendOutcome::Skipped;
        }
        if self.needs_session() && self.ensure_active_session().await.is_none() {
            warn!("[ConvCtl] 没有可用会话，忽略发送");
            return SendOutcome::Skipped;
        }

        let prepared = {
            let mut state = self.lock_state();
            match state.context.session_id.clone() {
                None => None,
                Some(session_id) => {
                    state.context.messages.push(ChatMessage::optimistic_user(text));
                    state.busy = true;
                    let persona = persona
                        .map(str::to_string)
                        .unwrap_or_else(|| state.context.persona.clone());
                    Some((session_id, persona, state.context.messages.clone()))
                }
            }
        };
        let Some((session_id, persona, snapshot)) = prepared else {
            warn!("[ConvCtl] 没有活跃会话，忽略发送");
            return SendOutcome::Skipped;
        };
        self.listener
            .on_messages_changed(session_id.clone(), snapshot)
            .await;
        self.listener.on_busy_changed(true).await;

        let req = ChatTurnReq {
            session_id: session_id.clone(),
            message: text.to_string(),
            persona,
        };
        let outcome = match self.backend.send_chat(&req).await {
            Ok(resp) => {
                // 回复内容以重新拉取的历史为准，不使用响应体
                tokio::join!(
                    self.fetch_history(&session_id),
                    self.fetch_stats(&session_id)
                );
                if resp.title_generated {
                    info!("[ConvCtl] 🏷️ 会话标题已生成，通知会话目录刷新: {}", session_id);
                    self.bus.publish();
                }
                SendOutcome::Delivered {
                    title_generated: resp.title_generated,
                }
            }
            Err(e) => {
                let kind = FailureKind::classify(&e);
                warn!(
                    "[ConvCtl] 发送消息失败，会话ID: {}, 分类: {:?}, 错误: {:?}",
                    session_id, kind, e
                );
                let snapshot = {
                    let mut state = self.lock_state();
                    if state.context.session_id.as_deref() == Some(session_id.as_str()) {
                        state
                            .context
                            .messages
                            .push(ChatMessage::failure_notice(&kind));
                        Some(state.context.messages.clone())
                    } else {
                        None
                    }
                };
                if let Some(messages) = snapshot {
                    self.listener
                        .on_messages_changed(session_id.clone(), messages)
                        .await;
                }
                SendOutcome::Failed(kind)
            }
        };

        self.lock_state().busy = false;
        self.listener.on_busy_changed(false).await;
        outcome
    }

    /// 清空活跃会话的消息；失败时状态不变
    pub async fn clear_chat(&self) -> bool {
        if self.needs_session() && self.ensure_active_session().await.is_none() {
            warn!("[ConvCtl] 没有可用会话，忽略清空");
            return false;
        }
        let Some(session_id) = self.active_session_id() else {
            debug!("[ConvCtl] 没有活跃会话，忽略清空");
            return false;
        };

        if let Err(e) = self.backend.clear_session(&session_id).await {
            error!("[ConvCtl] 清空会话失败，会话ID: {}, 错误: {:?}", session_id, e);
            return false;
        }

        let applied = {
            let mut state = self.lock_state();
            if state.context.session_id.as_deref() == Some(session_id.as_str()) {
                state.context.messages.clear();
                state.context.message_count = 0;
                state.context.backend_total = 0;
                true
            } else {
                false
            }
        };
        info!("[ConvCtl] 🧹 会话已清空: {}", session_id);
        if applied {
            self.listener
                .on_messages_changed(session_id, Vec::new())
                .await;
        }
        true
    }

    /// 删除会话；删除的是活跃会话时新建一个会话顶上
    pub async fn delete_session(&self, session_id: &str) -> bool {
        if let Err(e) = self.backend.delete_session(session_id).await {
            error!("[ConvCtl] 删除会话失败，会话ID: {}, 错误: {:?}", session_id, e);
            return false;
        }
        info!("[ConvCtl] 🗑️ 会话已删除: {}", session_id);

        let was_active = self.active_session_id().as_deref() == Some(session_id);
        if was_active && self.create_session(None, None).await.is_none() {
            error!("[ConvCtl] 删除活跃会话后新建会话失败，下一次用户操作时重试");
            self.lock_state().needs_session = true;
        }
        true
    }

    /// 重命名会话；不修改本地上下文，也不发布通知（由调用方刷新会话目录）
    pub async fn rename_session(&self, session_id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            debug!("[ConvCtl] 空标题，忽略重命名");
            return false;
        }
        match self.backend.rename_session(session_id, title).await {
            Ok(()) => {
                info!("[ConvCtl] ✏️ 会话已重命名，会话ID: {}, 标题: {}", session_id, title);
                true
            }
            Err(e) => {
                error!("[ConvCtl] 重命名会话失败，会话ID: {}, 错误: {:?}", session_id, e);
                false
            }
        }
    }

    /// 设置活跃会话；会话 ID 变化时清空旧消息并通知观察者
    async fn activate(&self, session_id: &str, persona: &str) {
        let changed = {
            let mut state = self.lock_state();
            let changed = state.context.session_id.as_deref() != Some(session_id);
            if changed {
                state.context.messages.clear();
                state.context.message_count = 0;
                state.context.backend_total = 0;
            }
            state.context.session_id = Some(session_id.to_string());
            state.context.persona = persona.to_string();
            state.phase = ControllerPhase::Active(session_id.to_string());
            state.needs_session = false;
            changed
        };

        if changed {
            self.active_tx.send_replace(Some(session_id.to_string()));
            self.listener
                .on_active_session_changed(session_id.to_string(), persona.to_string())
                .await;
        }
    }
}
