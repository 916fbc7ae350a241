//! 聊天后端 HTTP API 客户端
//!
//! 负责所有与后端的 HTTP 请求，实现 `ChatBackend`

use crate::chat::backend::ChatBackend;
use crate::chat::error::ApiError;
use crate::chat::types::{
    handle_http_response, ChatTurnReq, ChatTurnResp, CreateSessionReq, CreateSessionResp,
    HistoryMessage, PersonaInfo, PersonasResp, RenameSessionReq, SessionIdReq, SessionListResp,
    SessionStats, SessionSummary,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use tracing::{debug, info};
use uuid::Uuid;

/// 聊天后端 HTTP API 客户端
pub struct ChatApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ChatApi {
    /// 创建新的 API 客户端
    ///
    /// `client` 由调用方构造，可以预先配置默认请求头
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        Self {
            client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// 使用默认 HTTP 客户端创建
    pub fn with_base_url(api_base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::new(client, api_base_url))
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// 发送请求；传输层失败统一转换为 `ApiError`
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation_name: &str,
    ) -> Result<reqwest::Response> {
        let operation_id = Uuid::new_v4().to_string();
        debug!("[ChatAPI] {} 操作ID: {}", operation_name, operation_id);
        let response = request
            .header("operationID", &operation_id)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))
            .with_context(|| format!("{}请求失败", operation_name))?;
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for ChatApi {
    async fn list_personas(&self) -> Result<Vec<PersonaInfo>> {
        let url = self.url("/api/personas");
        debug!("[ChatAPI] 📡 请求人设列表: {}", url);

        let response = self.send(self.client.get(&url), "人设列表").await?;
        let resp = handle_http_response::<PersonasResp>(response, "人设列表").await?;

        info!("[ChatAPI] ✅ 人设列表响应，人设数: {}", resp.personas.len());
        Ok(resp.personas)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let url = self.url("/api/sessions");
        debug!("[ChatAPI] 📡 请求会话列表: {}", url);

        let response = self.send(self.client.get(&url), "会话列表").await?;
        let resp = handle_http_response::<SessionListResp>(response, "会话列表").await?;

        debug!(
            "[ChatAPI]   会话ID列表: {:?}",
            resp.sessions
                .iter()
                .map(|s| &s.session_id)
                .collect::<Vec<_>>()
        );
        Ok(resp.sessions)
    }

    async fn create_session(&self, title: Option<&str>, persona: &str) -> Result<CreateSessionResp> {
        let url = self.url("/api/sessions");
        info!(
            "[ChatAPI] 📡 新建会话，标题: {:?}, 人设: {}",
            title, persona
        );

        let request = self
            .client
            .post(&url)
            .json(&CreateSessionReq { title, persona });
        let response = self.send(request, "新建会话").await?;
        let resp = handle_http_response::<CreateSessionResp>(response, "新建会话").await?;

        info!("[ChatAPI] ✅ 新建会话成功，会话ID: {}", resp.session_id);
        Ok(resp)
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<HistoryMessage>> {
        let url = self.url("/api/history");
        debug!("[ChatAPI] 📡 请求会话历史，会话ID: {}", session_id);

        let request = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)]);
        let response = self.send(request, "会话历史").await?;
        let history = handle_http_response::<Vec<HistoryMessage>>(response, "会话历史").await?;

        debug!(
            "[ChatAPI] ✅ 会话历史响应，会话ID: {}, 条数: {}",
            session_id,
            history.len()
        );
        Ok(history)
    }

    async fn get_stats(&self, session_id: &str) -> Result<SessionStats> {
        let url = self.url("/api/stats");
        debug!("[ChatAPI] 📡 请求会话统计，会话ID: {}", session_id);

        let request = self
            .client
            .get(&url)
            .query(&[("session_id", session_id)]);
        let response = self.send(request, "会话统计").await?;
        handle_http_response::<SessionStats>(response, "会话统计").await
    }

    async fn send_chat(&self, req: &ChatTurnReq) -> Result<ChatTurnResp> {
        let url = self.url("/api/chat");
        info!(
            "[ChatAPI] 📡 发送消息，会话ID: {}, 人设: {}, 长度: {}",
            req.session_id,
            req.persona,
            req.message.chars().count()
        );

        let response = self.send(self.client.post(&url).json(req), "发送消息").await?;
        let resp = handle_http_response::<ChatTurnResp>(response, "发送消息").await?;

        info!(
            "[ChatAPI] ✅ 发送消息成功，会话ID: {}, 标题已生成: {}",
            req.session_id, resp.title_generated
        );
        Ok(resp)
    }

    async fn clear_session(&self, session_id: &str) -> Result<()> {
        let url = self.url("/api/clear");
        info!("[ChatAPI] 📡 清空会话，会话ID: {}", session_id);

        let request = self
            .client
            .delete(&url)
            .json(&SessionIdReq { session_id });
        let response = self.send(request, "清空会话").await?;
        handle_http_response::<IgnoredAny>(response, "清空会话").await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let url = self.url("/api/sessions");
        info!("[ChatAPI] 📡 删除会话，会话ID: {}", session_id);

        let request = self
            .client
            .delete(&url)
            .json(&SessionIdReq { session_id });
        let response = self.send(request, "删除会话").await?;
        handle_http_response::<IgnoredAny>(response, "删除会话").await?;
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<()> {
        let url = self.url("/api/sessions/rename");
        info!(
            "[ChatAPI] 📡 重命名会话，会话ID: {}, 新标题: {}",
            session_id, title
        );

        let request = self
            .client
            .post(&url)
            .json(&RenameSessionReq { session_id, title });
        let response = self.send(request, "重命名会话").await?;
        handle_http_response::<IgnoredAny>(response, "重命名会话").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::error::FailureKind;

    /// 绑定一个端口后立即释放，得到一个大概率没有监听者的地址
    fn unreachable_base_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = ChatApi::with_base_url("http://127.0.0.1:8000/").unwrap();
        assert_eq!(api.api_base_url(), "http://127.0.0.1:8000");
        assert_eq!(api.url("/api/chat"), "http://127.0.0.1:8000/api/chat");
    }

    #[tokio::test]
    async fn unreachable_server_classifies_as_network() {
        let api = ChatApi::with_base_url(unreachable_base_url()).unwrap();
        let err = api
            .send_chat(&ChatTurnReq {
                session_id: "s1".into(),
                message: "hello".into(),
                persona: "travel".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(FailureKind::classify(&err), FailureKind::NetworkUnreachable);
    }
}
