//! Fetcher port - ネットワーク転送
//!
//! HTTP クライアントそのものはこのクレートの外に置きます。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::domain::{CrawlTask, PacerError};

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            url,
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn for_task(task: &CrawlTask) -> Self {
        Self::get(task.url().clone())
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResult {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Fetcher は URL を取得（失敗時は `PacerError::Fetch`）
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, PacerError>;
}
