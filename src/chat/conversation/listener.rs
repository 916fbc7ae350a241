//! 活跃会话监听器回调接口

use crate::chat::conversation::models::ChatMessage;
use async_trait::async_trait;

/// 活跃会话监听器回调接口
#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 活跃会话切换（新建、切换、删除后重建）
    async fn on_active_session_changed(&self, session_id: String, persona: String);

    /// 消息列表变更（乐观追加、权威历史替换、清空、错误提示）
    async fn on_messages_changed(&self, session_id: String, messages: Vec<ChatMessage>);

    /// 忙碌状态变更（发送中）
    async fn on_busy_changed(&self, busy: bool);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_active_session_changed(&self, _session_id: String, _persona: String) {}
    async fn on_messages_changed(&self, _session_id: String, _messages: Vec<ChatMessage>) {}
    async fn on_busy_changed(&self, _busy: bool) {}
}
