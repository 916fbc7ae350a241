//! 后端错误类型与失败分类
//!
//! `ApiError` 是所有后端调用失败的根因，包在 `anyhow::Error` 里向上传递；
//! `FailureKind` 把它归类成面向用户的几种失败，并给出展示文案。

use thiserror::Error;

/// 后端调用失败的根因
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// 收到了响应，但 HTTP 状态不是成功
    #[error("HTTP 错误 {status}: {}", .detail.as_deref().unwrap_or("<无 detail>"))]
    Status { status: u16, detail: Option<String> },

    /// 完全没有收到响应（连接失败、连接被重置等）
    #[error("无法连接服务器: {0}")]
    Network(String),

    /// 收到了成功响应，但响应体无法解析
    #[error("解析响应失败: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: u16, detail: Option<String>) -> Self {
        Self::Status { status, detail }
    }

    /// 从 reqwest 的传输层错误构造
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                detail: None,
            };
        }
        Self::Network(err.to_string())
    }
}

/// 面向用户的失败分类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// 429，可能带有后端给出的 detail
    RateLimited { detail: Option<String> },
    /// 401 / 403，凭证或配置问题
    Forbidden,
    /// 408 / 504，后端自己报告的超时
    Timeout,
    /// 其他带 detail 的服务端错误，detail 原样展示
    ServerDetail(String),
    /// 没有收到任何响应
    NetworkUnreachable,
    /// 无法归类
    Unknown,
}

impl FailureKind {
    /// 沿错误链查找 `ApiError` 并归类，找不到时为 `Unknown`
    pub fn classify(err: &anyhow::Error) -> Self {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<ApiError>())
            .map(Self::from_api_error)
            .unwrap_or(Self::Unknown)
    }

    pub fn from_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::Status { status, detail } => {
                let detail = detail.as_ref().filter(|d| !d.trim().is_empty()).cloned();
                match status {
                    429 => Self::RateLimited { detail },
                    401 | 403 => Self::Forbidden,
                    408 | 504 => Self::Timeout,
                    _ => detail.map(Self::ServerDetail).unwrap_or(Self::Unknown),
                }
            }
            ApiError::Network(_) => Self::NetworkUnreachable,
            ApiError::Decode(_) => Self::Unknown,
        }
    }

    /// 展示给用户的错误文案
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { detail: Some(detail) } => detail.clone(),
            Self::RateLimited { detail: None } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            Self::Forbidden => "API key issue. Please contact support.".to_string(),
            Self::Timeout => "Request timeout. Please try again.".to_string(),
            Self::ServerDetail(detail) => detail.clone(),
            Self::NetworkUnreachable => {
                "Cannot connect to server. Please check your connection.".to_string()
            }
            Self::Unknown => "Sorry, something went wrong. Please try again.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn rate_limit_prefers_backend_detail() {
        let kind = FailureKind::from_api_error(&ApiError::status(429, Some("slow down".into())));
        assert_eq!(
            kind,
            FailureKind::RateLimited {
                detail: Some("slow down".into())
            }
        );
        assert_eq!(kind.user_message(), "slow down");

        let kind = FailureKind::from_api_error(&ApiError::status(429, None));
        assert!(kind.user_message().starts_with("Too many requests"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            FailureKind::from_api_error(&ApiError::status(403, Some("bad key".into()))),
            FailureKind::Forbidden
        );
        assert_eq!(
            FailureKind::from_api_error(&ApiError::status(504, None)),
            FailureKind::Timeout
        );
        assert_eq!(
            FailureKind::from_api_error(&ApiError::status(500, Some("Server error: boom".into()))),
            FailureKind::ServerDetail("Server error: boom".into())
        );
        assert_eq!(
            FailureKind::from_api_error(&ApiError::status(500, Some("   ".into()))),
            FailureKind::Unknown
        );
        assert_eq!(
            FailureKind::from_api_error(&ApiError::Network("refused".into())),
            FailureKind::NetworkUnreachable
        );
    }

    #[test]
    fn classify_sees_through_context() {
        let err: anyhow::Result<()> = Err(ApiError::Network("refused".into()).into());
        let err = err.context("发送聊天消息失败").unwrap_err();
        assert_eq!(FailureKind::classify(&err), FailureKind::NetworkUnreachable);
        assert!(FailureKind::classify(&err)
            .user_message()
            .contains("Cannot connect to server"));

        let plain = anyhow::anyhow!("其他错误");
        assert_eq!(FailureKind::classify(&plain), FailureKind::Unknown);
    }
}
