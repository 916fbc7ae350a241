pub mod api;
pub mod backend;
pub mod bus;
pub mod client;
pub mod conversation;
pub mod db;
pub mod error;
pub mod persona;
pub mod preference;
pub mod serialization;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出错误分类
pub use error::{ApiError, FailureKind};

// 重新导出会话相关类型
pub use conversation::{ChatMessage, ConversationController, MessageRole, SendOutcome};
pub use session::{SessionDirectory, SessionListItem};
