//! 本地偏好模块
//!
//! 持久化上次活跃的会话 ID 和上次使用的人设，进程重启后仍然保留

pub mod dao;
pub mod models;
pub mod service;
pub mod store;

// 重新导出主要类型
pub use dao::PreferenceDao;
pub use models::{PersistedPreference, ACTIVE_SESSION_KEY, PERSONA_KEY};
pub use service::SessionPreferences;
pub use store::{MemoryPreferenceStore, PreferenceStore, SqlitePreferenceStore};
