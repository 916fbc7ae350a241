//! 后端 API DTO 与通用 HTTP 响应处理

use crate::chat::error::ApiError;
use crate::chat::persona::DEFAULT_PERSONA;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

// ========== 人设相关结构体 ==========

/// 后端提供的人设条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaInfo {
    pub id: String,
    pub name: String,
    /// 后端字段名为 `emoji`，也接受 `icon`
    #[serde(default, alias = "icon")]
    pub emoji: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonasResp {
    #[serde(default)]
    pub personas: Vec<PersonaInfo>,
}

// ========== 会话相关结构体 ==========

/// 会话摘要（侧边栏列表的一项），直接从 `/api/sessions` 响应反序列化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// 会话 ID（服务端分配，不可变）
    pub session_id: String,
    /// 标题（未命名时为 None）
    #[serde(default)]
    pub title: Option<String>,
    /// 人设，缺失时为默认人设
    #[serde(default = "default_persona")]
    pub persona: String,
    /// 最后活动时间
    #[serde(
        default,
        deserialize_with = "crate::chat::serialization::deserialize_optional_timestamp"
    )]
    pub last_message_time: Option<DateTime<Utc>>,
    /// 内容摘要
    #[serde(default)]
    pub snippet: Option<String>,
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionListResp {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionReq<'a> {
    pub title: Option<&'a str>,
    pub persona: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResp {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionIdReq<'a> {
    pub session_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameSessionReq<'a> {
    pub session_id: &'a str,
    pub title: &'a str,
}

// ========== 消息相关结构体 ==========

/// `/api/history` 返回的一行原始记录
///
/// role 保留原始字符串：后端会写入 `bot`、`system`（标题标记）等值，
/// 由上层决定哪些进入对话记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(
        default,
        deserialize_with = "crate::chat::serialization::deserialize_optional_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionStats {
    pub total_messages: u64,
}

/// 一轮对话请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurnReq {
    pub session_id: String,
    pub message: String,
    pub persona: String,
}

/// 一轮对话响应（消息内容不以此为准，调用方必须重新拉取历史）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatTurnResp {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub title_generated: bool,
}

/// 后端的错误响应体：`{"detail": ...}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// 从错误响应体里提取 detail；字符串原样返回，其他 JSON 值序列化后返回
pub fn extract_detail(body: &[u8]) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// 通用 HTTP 响应处理函数：检查状态码并反序列化响应体
///
/// 失败时返回的 `anyhow::Error` 根因总是 `ApiError`，便于上层归类。
/// 所有 API 都可以共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(ApiError::status(status.as_u16(), extract_detail(&body_bytes)).into());
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    // 确认类接口可能返回空 body，按 JSON null 处理
    let payload: &[u8] = if body_bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &body_bytes
    };

    serde_json::from_slice(payload).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        ApiError::Decode(e.to_string()).into()
    })
}
