//! Errors - エラー型と分類
//!
//! `ErrorKind` は運用上の分類で、RetryPolicy がこれを見て retry / dead-letter を決めます。

use thiserror::Error;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨）
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: インフラエラー（frontier / retry buffer / seen store の障害、worker の panic）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum PacerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("no parser registered for content type '{0}'")]
    ParserNotFound(String),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config file: {0}")]
    ConfigFormat(#[from] toml::de::Error),
}

impl PacerError {
    /// Fetch failure with an HTTP status.
    pub fn http(url: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            url: url.into(),
            status: Some(status),
            message: format!("HTTP {status}"),
        }
    }

    /// Fetch failure below HTTP (connect, timeout, ...).
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PacerError::Fetch {
                status: Some(status),
                ..
            } => {
                // 408 / 429 are the server asking us to come back later.
                if (400..500).contains(status) && *status != 408 && *status != 429 {
                    ErrorKind::Permanent
                } else {
                    ErrorKind::Transient
                }
            }
            PacerError::Fetch { status: None, .. } => ErrorKind::Transient,
            PacerError::Step { .. } => ErrorKind::Transient,
            PacerError::ParserNotFound(_)
            | PacerError::Parse(_)
            | PacerError::Config(_)
            | PacerError::ConfigFormat(_) => ErrorKind::Permanent,
            PacerError::Store(_) | PacerError::Worker(_) | PacerError::Io(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}
