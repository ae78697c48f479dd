//! Error definitions for the provider and blob-store clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP client error: {source}")]
    HttpClient { source: reqwest::Error },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Auth error: {message}")]
    Auth { message: String },
}

impl Error {
    /// 构造配置错误。
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// 不带分类前缀的消息。
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::ApiError { message, .. }
            | Self::InvalidConfig { message }
            | Self::Parse { message }
            | Self::Auth { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// 错误是否源自配置（缺失/无效的凭据、环境变量等）。
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::Auth { .. })
    }
}

/// 传输错误去掉请求 URL，对象名等标识不进入错误消息。
impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Self::HttpClient {
            source: source.without_url(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
