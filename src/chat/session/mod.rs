//! 会话目录模块
//!
//! 维护全部会话的列表（侧边栏），按需、定时、收到通知时从后端刷新

pub mod listener;
pub mod models;
pub mod service;

// 重新导出主要类型
pub use listener::{EmptySessionDirectoryListener, SessionDirectoryListener};
pub use models::{SessionListItem, EMPTY_LIST_LABEL, LOADING_LABEL, UNTITLED_SESSION_LABEL};
pub use service::{MountedDirectory, SessionDirectory, DEFAULT_POLL_INTERVAL};
