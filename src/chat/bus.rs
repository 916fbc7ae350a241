//! 跨组件通知总线
//!
//! 单一主题（会话列表已变更）的发布/订阅。控制器和会话目录在构造时注入
//! 同一个 `NotificationBus`，彼此之间不直接引用。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// 总线主题名
pub const SESSIONS_CHANGED_TOPIC: &str = "refreshSessions";

/// "会话列表已变更"监听器
///
/// 在 `publish()` 的调用线程上同步执行，不能阻塞；需要异步工作时自行派发任务。
pub trait SessionsChangedListener: Send + Sync {
    fn on_sessions_changed(&self);
}

impl<F> SessionsChangedListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_sessions_changed(&self) {
        self()
    }
}

type ListenerEntry = (u64, Arc<dyn SessionsChangedListener>);

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<ListenerEntry>>,
}

impl BusInner {
    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(entry_id, _)| *entry_id != id);
        before != listeners.len()
    }
}

/// 通知总线（克隆后共享同一组监听器）
#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册监听器，返回的 `Subscription` 被丢弃时自动注销
    pub fn subscribe(&self, listener: Arc<dyn SessionsChangedListener>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        debug!("[Bus] 注册监听器 #{}，主题: {}", id, SESSIONS_CHANGED_TOPIC);
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 按注册顺序同步通知所有监听器，返回通知的数量
    pub fn publish(&self) -> usize {
        // 先复制一份，回调里注册/注销不会死锁
        let listeners: Vec<Arc<dyn SessionsChangedListener>> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        debug!(
            "[Bus] 发布 {}，监听器数: {}",
            SESSIONS_CHANGED_TOPIC,
            listeners.len()
        );
        for listener in &listeners {
            listener.on_sessions_changed();
        }
        listeners.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// 订阅凭证
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// 显式注销
    pub fn unsubscribe(self) {
        // Drop 负责实际移除
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(self.id) {
                debug!("[Bus] 注销监听器 #{}", self.id);
            }
        }
    }
}
