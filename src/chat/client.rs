//! 聊天客户端
//!
//! 把偏好存储、会话目录、活跃会话控制器和通知总线组装在一起。
//! 侧边栏操作（新建、重命名、删除）完成后顺带刷新会话目录。

use crate::chat::api::ChatApi;
use crate::chat::backend::ChatBackend;
use crate::chat::bus::NotificationBus;
use crate::chat::conversation::{
    ConversationController, ConversationListener, EmptyConversationListener,
};
use crate::chat::persona::{header_label, DEFAULT_PERSONA};
use crate::chat::preference::{PreferenceStore, SessionPreferences, SqlitePreferenceStore};
use crate::chat::session::{
    EmptySessionDirectoryListener, MountedDirectory, SessionDirectory, SessionDirectoryListener,
    DEFAULT_POLL_INTERVAL,
};
use crate::chat::types::PersonaInfo;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端 HTTP API 基础地址
    pub api_base_url: String,
    /// 本地偏好使用的 SQLite 数据库 URL
    ///
    /// 例如：`sqlite://travelbuddy_prefs.db?mode=rwc`
    pub preference_db_url: String,
    /// 会话目录的轮询间隔
    pub session_poll_interval: Duration,
    /// 没有持久化人设时使用的人设
    pub default_persona: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            preference_db_url: "sqlite://travelbuddy_prefs.db?mode=rwc".to_string(),
            session_poll_interval: DEFAULT_POLL_INTERVAL,
            default_persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 调用方注册的监听器
#[derive(Clone)]
pub struct ClientListeners {
    pub conversation: Arc<dyn ConversationListener>,
    pub directory: Arc<dyn SessionDirectoryListener>,
}

impl Default for ClientListeners {
    fn default() -> Self {
        Self {
            conversation: Arc::new(EmptyConversationListener),
            directory: Arc::new(EmptySessionDirectoryListener),
        }
    }
}

/// 聊天客户端
pub struct ChatClient {
    config: ClientConfig,
    backend: Arc<dyn ChatBackend>,
    bus: NotificationBus,
    conversation: Arc<ConversationController>,
    directory: Arc<SessionDirectory>,
    // 人设列表缓存（拉取成功后不再重复请求）
    personas: Mutex<Option<Vec<PersonaInfo>>>,
    mounted: Mutex<Option<MountedDirectory>>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl ChatClient {
    /// 打开本地偏好存储并创建 HTTP 后端
    pub async fn connect(config: ClientConfig, listeners: ClientListeners) -> Result<Self> {
        let store = SqlitePreferenceStore::open(&config.preference_db_url).await?;
        let backend = ChatApi::with_base_url(config.api_base_url.clone())?;
        info!("[Client] 🔗 后端地址: {}", backend.api_base_url());
        Ok(Self::with_parts(
            config,
            Arc::new(backend),
            Arc::new(store),
            listeners,
        ))
    }

    /// 使用给定的后端和偏好存储组装客户端
    pub fn with_parts(
        config: ClientConfig,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn PreferenceStore>,
        listeners: ClientListeners,
    ) -> Self {
        let bus = NotificationBus::new();
        let conversation = Arc::new(
            ConversationController::with_listener(
                backend.clone(),
                SessionPreferences::new(store),
                bus.clone(),
                listeners.conversation,
            )
            .with_default_persona(config.default_persona.clone()),
        );
        let directory = Arc::new(SessionDirectory::with_listener(
            backend.clone(),
            listeners.directory,
        ));
        Self {
            config,
            backend,
            bus,
            conversation,
            directory,
            personas: Mutex::new(None),
            mounted: Mutex::new(None),
            observer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Arc<ConversationController> {
        &self.conversation
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// 启动：观察活跃会话、初始化控制器、挂载会话目录
    ///
    /// 返回初始化后的活跃会话 ID；新建会话失败时为 None。
    pub async fn start(&self) -> Option<String> {
        {
            let mut observer = self.observer.lock().unwrap_or_else(|e| e.into_inner());
            if observer.is_some() {
                warn!("[Client] 重复启动，忽略");
                return self.conversation.active_session_id();
            }
            *observer = Some(self.conversation.spawn_active_session_observer());
        }

        let session_id = self.conversation.initialize().await;

        let mounted = self
            .directory
            .mount(&self.bus, self.config.session_poll_interval);
        *self.mounted.lock().unwrap_or_else(|e| e.into_inner()) = Some(mounted);

        info!("[Client] ✅ 客户端已启动，活跃会话: {:?}", session_id);
        session_id
    }

    /// 人设列表（带缓存）
    pub async fn list_personas(&self) -> Result<Vec<PersonaInfo>> {
        if let Some(cached) = self
            .personas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Ok(cached);
        }
        let personas = self.backend.list_personas().await?;
        *self.personas.lock().unwrap_or_else(|e| e.into_inner()) = Some(personas.clone());
        Ok(personas)
    }

    /// 聊天头部展示，人设列表拉取失败时回退到默认名称
    pub async fn header_label(&self) -> String {
        let personas = match self.list_personas().await {
            Ok(personas) => personas,
            Err(e) => {
                warn!("[Client] 拉取人设列表失败: {:?}", e);
                Vec::new()
            }
        };
        header_label(&personas, &self.conversation.persona())
    }

    /// 切换到侧边栏中的会话，人设取自会话列表
    pub async fn switch_session(&self, session_id: &str) -> Option<String> {
        let persona = self
            .directory
            .sessions()
            .into_iter()
            .find(|s| s.session_id == session_id)
            .map(|s| s.persona)
            .unwrap_or_else(|| self.conversation.persona());
        self.conversation
            .switch_to(Some(session_id), &persona)
            .await
    }

    /// 新建会话并刷新会话目录
    pub async fn new_session(&self, title: Option<&str>) -> Option<String> {
        let created = self.conversation.create_session(title, None).await;
        if created.is_some() {
            self.directory.refresh().await;
        }
        created
    }

    /// 切换人设（会新建会话）并刷新会话目录
    pub async fn change_persona(&self, persona: &str) -> Option<String> {
        let created = self.conversation.change_persona(persona).await;
        if created.is_some() {
            self.directory.refresh().await;
        }
        created
    }

    /// 重命名会话并刷新会话目录
    pub async fn rename_session(&self, session_id: &str, title: &str) -> bool {
        let ok = self.conversation.rename_session(session_id, title).await;
        if ok {
            self.directory.refresh().await;
        }
        ok
    }

    /// 删除会话并刷新会话目录
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let ok = self.conversation.delete_session(session_id).await;
        if ok {
            self.directory.refresh().await;
        }
        ok
    }

    /// 停止轮询、注销订阅、停止观察任务
    pub fn shutdown(&self) {
        if let Some(mounted) = self
            .mounted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            mounted.unmount();
        }
        if let Some(observer) = self
            .observer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            observer.abort();
            info!("[Client] 👋 客户端已关闭");
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
