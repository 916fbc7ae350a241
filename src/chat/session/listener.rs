//! 会话目录监听器回调接口

use crate::chat::types::SessionSummary;
use async_trait::async_trait;

/// 会话目录监听器回调接口
#[async_trait]
pub trait SessionDirectoryListener: Send + Sync {
    /// 刷新开始 / 结束（loading 状态变更）
    async fn on_loading_changed(&self, loading: bool);

    /// 会话列表被整体替换
    async fn on_session_list_changed(&self, sessions: Vec<SessionSummary>);

    /// 刷新失败，列表保持上一次成功的结果
    async fn on_refresh_failed(&self, error: String);
}

/// 空实现（默认监听器）
pub struct EmptySessionDirectoryListener;

#[async_trait]
impl SessionDirectoryListener for EmptySessionDirectoryListener {
    async fn on_loading_changed(&self, _loading: bool) {}
    async fn on_session_list_changed(&self, _sessions: Vec<SessionSummary>) {}
    async fn on_refresh_failed(&self, _error: String) {}
}
