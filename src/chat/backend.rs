//! 后端接口抽象
//!
//! 控制器和会话目录只依赖这个 trait；`ChatApi` 是基于 HTTP 的实现。

use crate::chat::types::{
    ChatTurnReq, ChatTurnResp, CreateSessionResp, HistoryMessage, PersonaInfo, SessionStats,
    SessionSummary,
};
use anyhow::Result;
use async_trait::async_trait;

/// 会话后端
///
/// 所有方法失败时返回的错误链中都带有 `ApiError`。
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 获取人设列表
    async fn list_personas(&self) -> Result<Vec<PersonaInfo>>;

    /// 获取全部会话
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// 新建会话，总是返回新的会话 ID
    async fn create_session(&self, title: Option<&str>, persona: &str) -> Result<CreateSessionResp>;

    /// 获取会话历史（按时间正序）
    async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryMessage>>;

    /// 获取会话统计
    async fn get_stats(&self, session_id: &str) -> Result<SessionStats>;

    /// 提交一轮对话；历史不随响应返回
    async fn send_chat(&self, req: &ChatTurnReq) -> Result<ChatTurnResp>;

    /// 清空会话消息
    async fn clear_session(&self, session_id: &str) -> Result<()>;

    /// 删除会话
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// 重命名会话
    async fn rename_session(&self, session_id: &str, title: &str) -> Result<()>;
}
