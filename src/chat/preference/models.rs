//! 偏好本地模型定义

/// 上次活跃会话 ID 的存储键
pub const ACTIVE_SESSION_KEY: &str = "travelbuddy_active_session";

/// 上次使用人设的存储键
pub const PERSONA_KEY: &str = "travelbuddy_persona";

/// 启动时读出的偏好
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedPreference {
    /// 上次活跃的会话 ID
    pub last_session_id: Option<String>,
    /// 上次使用的人设
    pub last_persona: Option<String>,
}
