pub mod chat;

// 重新导出常用类型，方便外部使用
pub use chat::{
    bus::NotificationBus,
    client::{ChatClient, ClientConfig, ClientListeners},
    conversation::{ConversationController, ConversationListener},
    session::{SessionDirectory, SessionDirectoryListener},
    types::{PersonaInfo, SessionSummary},
    ApiError, FailureKind,
};
