//! 活跃会话本地模型定义

use crate::chat::error::FailureKind;
use crate::chat::persona::DEFAULT_PERSONA;
use crate::chat::types::HistoryMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// 解析后端角色；`bot` / `model` 都是助手，`system` 等其他角色不进入对话记录
    pub fn from_backend(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Self::User),
            "assistant" | "bot" | "model" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// 对话记录中的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// 本地乐观追加、尚未确认的消息为 None
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// 乐观追加的用户消息
    pub fn optimistic_user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: None,
        }
    }

    /// 发送失败时本地合成的助手消息
    pub fn failure_notice(kind: &FailureKind) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: format!("⚠️ {}", kind.user_message()),
            timestamp: Some(Utc::now()),
        }
    }

    /// 从后端历史记录转换，非对话角色返回 None
    pub fn from_history(msg: HistoryMessage) -> Option<Self> {
        MessageRole::from_backend(&msg.role).map(|role| Self {
            role,
            content: msg.content,
            timestamp: msg.timestamp,
        })
    }
}

/// 活跃上下文：当前会话 ID、人设、消息列表和派生的消息数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveContext {
    pub session_id: Option<String>,
    pub persona: String,
    pub messages: Vec<ChatMessage>,
    /// 最近一次权威历史中的对话消息数，乐观追加不计入
    pub message_count: u64,
    /// 后端统计的总行数，包含 `system` 标题标记等不展示的行
    pub backend_total: u64,
}

impl Default for ActiveContext {
    fn default() -> Self {
        Self {
            session_id: None,
            persona: DEFAULT_PERSONA.to_string(),
            messages: Vec::new(),
            message_count: 0,
            backend_total: 0,
        }
    }
}

/// 控制器状态：`Uninitialized → Initializing → Active(sessionId)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerPhase {
    Uninitialized,
    Initializing,
    Active(String),
}

/// 发送消息的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 空消息或没有活跃会话，什么都没做
    Skipped,
    /// 发送成功，历史已按后端结果重新拉取
    Delivered { title_generated: bool },
    /// 发送失败，错误提示已追加到对话记录
    Failed(FailureKind),
}
