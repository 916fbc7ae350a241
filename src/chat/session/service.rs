//! 会话目录服务层
//!
//! 列表每次整体替换（最后一次拉取获胜），不做增量合并。定时轮询和总线通知
//! 走同一条刷新路径，重叠刷新只是幂等覆盖。

use crate::chat::backend::ChatBackend;
use crate::chat::bus::{NotificationBus, Subscription};
use crate::chat::session::listener::{EmptySessionDirectoryListener, SessionDirectoryListener};
use crate::chat::session::models::SessionListItem;
use crate::chat::types::SessionSummary;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 默认轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// 会话目录
pub struct SessionDirectory {
    backend: Arc<dyn ChatBackend>,
    listener: Arc<dyn SessionDirectoryListener>,
    /// 上一次成功拉取的列表
    sessions: Mutex<Vec<SessionSummary>>,
    /// 进行中的刷新数量，大于 0 即为 loading
    in_flight: AtomicUsize,
    /// 总线订阅（目录销毁时随之注销）
    subscription: Mutex<Option<Subscription>>,
}

impl SessionDirectory {
    /// 创建会话目录（使用默认空监听器）
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_listener(backend, Arc::new(EmptySessionDirectoryListener))
    }

    /// 创建会话目录（带自定义监听器）
    pub fn with_listener(
        backend: Arc<dyn ChatBackend>,
        listener: Arc<dyn SessionDirectoryListener>,
    ) -> Self {
        Self {
            backend,
            listener,
            sessions: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            subscription: Mutex::new(None),
        }
    }

    /// 当前列表的快照
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 侧边栏展示用的列表
    pub fn list_items(&self, active_session_id: Option<&str>) -> Vec<SessionListItem> {
        self.sessions()
            .iter()
            .map(|s| SessionListItem::from_summary(s, active_session_id))
            .collect()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// 从后端拉取完整列表并整体替换
    ///
    /// 失败时保留上一次成功的列表，只记录日志。返回是否成功。
    pub async fn refresh(&self) -> bool {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.listener.on_loading_changed(true).await;
        }
        debug!("[SessionDir] 🔄 刷新会话列表");

        let ok = match self.backend.list_sessions().await {
            Ok(list) => {
                info!("[SessionDir] ✅ 会话列表刷新完成，会话数: {}", list.len());
                *self.sessions.lock().unwrap_or_else(|e| e.into_inner()) = list.clone();
                self.listener.on_session_list_changed(list).await;
                true
            }
            Err(e) => {
                error!("[SessionDir] 刷新会话列表失败，保留旧列表: {:?}", e);
                self.listener.on_refresh_failed(format!("{:#}", e)).await;
                false
            }
        };

        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.listener.on_loading_changed(false).await;
        }
        ok
    }

    /// 订阅总线：每次收到"会话列表已变更"立即刷新，与轮询计时无关
    ///
    /// 重复订阅会替换旧的订阅。需要在 tokio 运行时内发布通知。
    pub fn subscribe_to_external_refresh(self: &Arc<Self>, bus: &NotificationBus) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let subscription = bus.subscribe(Arc::new(move || {
            let Some(directory) = weak.upgrade() else {
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        directory.refresh().await;
                    });
                }
                Err(_) => warn!("[SessionDir] 不在 tokio 运行时内，忽略刷新通知"),
            }
        }));
        *self.subscription.lock().unwrap_or_else(|e| e.into_inner()) = Some(subscription);
        info!("[SessionDir] 已订阅会话变更通知");
    }

    /// 注销总线订阅
    pub fn unsubscribe_external_refresh(&self) {
        if let Some(subscription) = self
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            subscription.unsubscribe();
            info!("[SessionDir] 已注销会话变更通知");
        }
    }

    /// 启动定时刷新：立即刷新一次，之后每隔 `every` 刷新一次
    ///
    /// `every` 为零时使用默认间隔。任务只持有弱引用，目录被销毁后自动退出。
    pub fn start_polling(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let every = if every.is_zero() {
            warn!(
                "[SessionDir] 轮询间隔为零，改用默认间隔: {:?}",
                DEFAULT_POLL_INTERVAL
            );
            DEFAULT_POLL_INTERVAL
        } else {
            every
        };
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // 第一次 tick 立即完成
                ticker.tick().await;
                let Some(directory) = weak.upgrade() else {
                    debug!("[SessionDir] 目录已销毁，停止轮询");
                    break;
                };
                directory.refresh().await;
            }
        })
    }

    /// 挂载：订阅总线并开始轮询；返回的句柄被丢弃时两者一起停止
    pub fn mount(self: &Arc<Self>, bus: &NotificationBus, every: Duration) -> MountedDirectory {
        self.subscribe_to_external_refresh(bus);
        let poller = self.start_polling(every);
        info!("[SessionDir] 已挂载，轮询间隔: {:?}", every);
        MountedDirectory {
            directory: self.clone(),
            poller: Some(poller),
        }
    }
}

/// 已挂载的会话目录
pub struct MountedDirectory {
    directory: Arc<SessionDirectory>,
    poller: Option<JoinHandle<()>>,
}

impl MountedDirectory {
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// 停止轮询并注销订阅
    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
            self.directory.unsubscribe_external_refresh();
            info!("[SessionDir] 已卸载");
        }
    }
}

impl Drop for MountedDirectory {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::error::ApiError;
    use crate::chat::testing::{init_test_logger, wait_until, FakeBackend, LIST_SESSIONS, RENAME_SESSION};
    use async_trait::async_trait;

    fn directory(backend: &Arc<FakeBackend>) -> Arc<SessionDirectory> {
        Arc::new(SessionDirectory::new(backend.clone()))
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        init_test_logger();
        let backend = FakeBackend::new();
        backend.seed_session("a", "travel", &[("user", "hi"), ("bot", "hello")]);
        backend.seed_session("b", "career", &[]);
        let dir = directory(&backend);

        assert!(dir.refresh().await);
        let first = serde_json::to_vec(&dir.sessions()).unwrap();
        assert!(dir.refresh().await);
        let second = serde_json::to_vec(&dir.sessions()).unwrap();

        assert_eq!(first, second);
        assert_eq!(dir.sessions().len(), 2);
        assert!(!dir.is_loading());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_good_list() {
        let backend = FakeBackend::new();
        backend.seed_session("a", "travel", &[]);
        let dir = directory(&backend);
        assert!(dir.refresh().await);

        backend.fail(LIST_SESSIONS, ApiError::Network("refused".into()));
        assert!(!dir.refresh().await);
        assert_eq!(dir.sessions().len(), 1);
        assert!(!dir.is_loading());
    }

    #[tokio::test]
    async fn rename_of_unknown_session_leaves_list_unchanged() {
        let backend = FakeBackend::new();
        backend.seed_session("a", "travel", &[]);
        let dir = directory(&backend);
        dir.refresh().await;
        let before = dir.sessions();

        let result = backend.rename_session("missing", "New title").await;
        assert!(result.is_err());
        dir.refresh().await;

        assert_eq!(dir.sessions(), before);
        assert_eq!(backend.calls(RENAME_SESSION), 1);
    }

    #[tokio::test]
    async fn publish_triggers_exactly_one_refresh() {
        let backend = FakeBackend::new();
        let bus = NotificationBus::new();
        let dir = directory(&backend);
        dir.subscribe_to_external_refresh(&bus);

        assert_eq!(bus.publish(), 1);
        assert!(wait_until(|| backend.calls(LIST_SESSIONS) == 1).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 1);

        dir.unsubscribe_external_refresh();
        assert_eq!(bus.publish(), 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_refreshes_immediately_then_on_interval() {
        let backend = FakeBackend::new();
        let dir = directory(&backend);
        let bus = NotificationBus::new();
        let mounted = dir.mount(&bus, DEFAULT_POLL_INTERVAL);

        // 挂载后立即刷新一次
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 1);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 2);

        // 通知刷新不影响轮询节奏
        bus.publish();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 3);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 4);

        mounted.unmount();
        assert_eq!(bus.subscriber_count(), 0);
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_falls_back_to_default() {
        let backend = FakeBackend::new();
        let dir = directory(&backend);
        let poller = dir.start_polling(Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 1);
        assert!(!poller.is_finished());

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
        assert_eq!(backend.calls(LIST_SESSIONS), 2);
        assert!(!poller.is_finished());
        poller.abort();
    }

    #[tokio::test]
    async fn listener_sees_loading_and_list() {
        #[derive(Default)]
        struct Recorder {
            events: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl SessionDirectoryListener for Recorder {
            async fn on_loading_changed(&self, loading: bool) {
                self.events.lock().unwrap().push(format!("loading={}", loading));
            }
            async fn on_session_list_changed(&self, sessions: Vec<SessionSummary>) {
                self.events.lock().unwrap().push(format!("list={}", sessions.len()));
            }
            async fn on_refresh_failed(&self, _error: String) {
                self.events.lock().unwrap().push("failed".into());
            }
        }

        let backend = FakeBackend::new();
        backend.seed_session("a", "travel", &[]);
        let recorder = Arc::new(Recorder::default());
        let dir = SessionDirectory::with_listener(backend.clone(), recorder.clone());

        dir.refresh().await;
        backend.fail(LIST_SESSIONS, ApiError::status(500, None));
        dir.refresh().await;

        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![
                "loading=true",
                "list=1",
                "loading=false",
                "loading=true",
                "failed",
                "loading=false"
            ]
        );
    }
}
