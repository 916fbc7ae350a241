//! 会话目录的展示模型

use crate::chat::persona::persona_icon;
use crate::chat::types::SessionSummary;
use chrono::{DateTime, Utc};

/// 未命名会话的占位标题
pub const UNTITLED_SESSION_LABEL: &str = "New chat";

/// 列表为空时的提示
pub const EMPTY_LIST_LABEL: &str = "No chats yet";

/// 刷新中的提示
pub const LOADING_LABEL: &str = "Loading…";

/// 侧边栏的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListItem {
    pub session_id: String,
    /// 标题，未命名时为占位标题
    pub title: String,
    /// 人设图标，未知人设回退到默认图标
    pub icon: &'static str,
    pub persona: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl SessionListItem {
    pub fn from_summary(summary: &SessionSummary, active_session_id: Option<&str>) -> Self {
        let title = summary
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED_SESSION_LABEL)
            .to_string();
        Self {
            session_id: summary.session_id.clone(),
            title,
            icon: persona_icon(&summary.persona),
            persona: summary.persona.clone(),
            last_activity: summary.last_message_time,
            is_active: active_session_id == Some(summary.session_id.as_str()),
        }
    }
}
