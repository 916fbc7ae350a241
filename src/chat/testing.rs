//! 测试用的内存后端
//!
//! 行为对齐真实后端：未知会话的历史为空、发送消息会隐式建会话、
//! 首条消息生成标题；带标题新建和重命名会写入 `system` 标题标记行，
//! 统计计入所有行。支持按操作注入失败、统计调用次数、拦住发送请求。

use crate::chat::backend::ChatBackend;
use crate::chat::error::ApiError;
use crate::chat::types::{
    ChatTurnReq, ChatTurnResp, CreateSessionResp, HistoryMessage, PersonaInfo, SessionStats,
    SessionSummary,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const LIST_PERSONAS: &str = "list_personas";
pub const LIST_SESSIONS: &str = "list_sessions";
pub const CREATE_SESSION: &str = "create_session";
pub const GET_HISTORY: &str = "get_history";
pub const GET_STATS: &str = "get_stats";
pub const SEND_CHAT: &str = "send_chat";
pub const CLEAR_SESSION: &str = "clear_session";
pub const DELETE_SESSION: &str = "delete_session";
pub const RENAME_SESSION: &str = "rename_session";

static INIT_LOGGER: Once = Once::new();

/// 测试日志：当前 crate 打开 debug
pub fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,travelbuddy_sdk_core_rust=debug");
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// 等待条件成立（最多约 2 秒）
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

struct FakeSession {
    session_id: String,
    title: Option<String>,
    persona: String,
    messages: Vec<HistoryMessage>,
    last_message_time: Option<DateTime<Utc>>,
}

impl FakeSession {
    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            title: self.title.clone(),
            persona: self.persona.clone(),
            last_message_time: self.last_message_time,
            snippet: self.messages.last().map(|m| m.content.clone()),
        }
    }

    fn mark_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
        self.push("system", &format!("[title]{}", title));
    }

    fn push(&mut self, role: &str, content: &str) {
        let now = Utc::now();
        self.messages.push(HistoryMessage {
            id: Some(self.messages.len() as i64 + 1),
            session_id: Some(self.session_id.clone()),
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Some(now),
        });
        self.last_message_time = Some(now);
    }
}

/// 拦住发送请求的闸门
#[derive(Clone)]
pub struct SendGate {
    /// 后端收到发送请求时通知
    pub started: Arc<Notify>,
    /// 测试放行发送请求
    pub release: Arc<Notify>,
}

#[derive(Default)]
pub struct FakeBackend {
    sessions: Mutex<Vec<FakeSession>>,
    failures: Mutex<HashMap<&'static str, ApiError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    send_gate: Mutex<Option<SendGate>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 让某个操作持续失败
    pub fn fail(&self, op: &'static str, err: ApiError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn heal(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// 预置会话，messages 为 (role, content)
    pub fn seed_session(&self, session_id: &str, persona: &str, messages: &[(&str, &str)]) {
        let mut session = FakeSession {
            session_id: session_id.to_string(),
            title: None,
            persona: persona.to_string(),
            messages: Vec::new(),
            last_message_time: None,
        };
        for (role, content) in messages {
            session.push(role, content);
        }
        self.sessions.lock().unwrap().push(session);
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.session_id.clone())
            .collect()
    }

    pub fn history_of(&self, session_id: &str) -> Vec<HistoryMessage> {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.session_id == session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// 之后的每次发送都会停在闸门处，直到测试放行
    pub fn hold_sends(&self) -> SendGate {
        let gate = SendGate {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        *self.send_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    fn record(&self, op: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn list_personas(&self) -> Result<Vec<PersonaInfo>> {
        self.record(LIST_PERSONAS)?;
        Ok(vec![
            PersonaInfo {
                id: "travel".into(),
                name: "Travel Buddy".into(),
                emoji: "✈️".into(),
            },
            PersonaInfo {
                id: "career".into(),
                name: "Career Coach".into(),
                emoji: "💼".into(),
            },
        ])
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.record(LIST_SESSIONS)?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .map(FakeSession::summary)
            .collect())
    }

    async fn create_session(&self, title: Option<&str>, persona: &str) -> Result<CreateSessionResp> {
        self.record(CREATE_SESSION)?;
        let session_id = Uuid::new_v4().to_string();
        let mut session = FakeSession {
            session_id: session_id.clone(),
            title: None,
            persona: persona.to_string(),
            messages: Vec::new(),
            last_message_time: None,
        };
        if let Some(title) = title {
            session.mark_title(title);
        }
        self.sessions.lock().unwrap().push(session);
        Ok(CreateSessionResp {
            session_id,
            title: title.map(str::to_string),
        })
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryMessage>> {
        self.record(GET_HISTORY)?;
        Ok(self.history_of(session_id))
    }

    async fn get_stats(&self, session_id: &str) -> Result<SessionStats> {
        self.record(GET_STATS)?;
        Ok(SessionStats {
            total_messages: self.history_of(session_id).len() as u64,
        })
    }

    async fn send_chat(&self, req: &ChatTurnReq) -> Result<ChatTurnResp> {
        self.record(SEND_CHAT)?;
        let gate = self.send_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        let mut sessions = self.sessions.lock().unwrap();
        let index = match sessions.iter().position(|s| s.session_id == req.session_id) {
            Some(index) => index,
            None => {
                sessions.push(FakeSession {
                    session_id: req.session_id.clone(),
                    title: None,
                    persona: req.persona.clone(),
                    messages: Vec::new(),
                    last_message_time: None,
                });
                sessions.len() - 1
            }
        };
        let session = &mut sessions[index];
        let reply = format!("Reply: {}", req.message.trim());
        session.push("user", req.message.trim());
        session.push("bot", &reply);

        let title_generated = session.title.is_none();
        if title_generated {
            session.title = Some(req.message.trim().chars().take(30).collect());
        }
        Ok(ChatTurnResp {
            reply: Some(reply),
            title_generated,
        })
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.record(CLEAR_SESSION)?;
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.session_id == session_id)
        {
            session.messages.clear();
        }
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.record(DELETE_SESSION)?;
        self.sessions
            .lock()
            .unwrap()
            .retain(|s| s.session_id != session_id);
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<()> {
        self.record(RENAME_SESSION)?;
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.iter_mut().find(|s| s.session_id == session_id) {
            Some(session) => {
                session.mark_title(title);
                Ok(())
            }
            None => Err(ApiError::status(404, Some("Session not found".into())).into()),
        }
    }
}
