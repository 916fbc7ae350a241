//! 活跃会话模块
//!
//! 管理"当前打开"的会话：会话 ID、人设、消息列表和派生的消息数

pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use listener::{ConversationListener, EmptyConversationListener};
pub use models::{ActiveContext, ChatMessage, ControllerPhase, MessageRole, SendOutcome};
pub use service::ConversationController;
