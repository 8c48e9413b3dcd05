use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::TaskId;

/// Precomputed routing tag (fast path for `RouteResolver`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteHint(String);

impl RouteHint {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One crawl target and its attempt metadata.
///
/// Immutable: every transition (`deferred`, `retried`, `child`) returns a new value,
/// so a task handed to the frontier, the retry buffer and a worker is never shared mutably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    id: TaskId,
    url: Url,
    hint: Option<RouteHint>,
    /// Failed attempts so far.
    attempt: u32,
    depth: u32,
    discovered_at: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
}

impl CrawlTask {
    pub fn new(id: TaskId, url: Url, discovered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            hint: None,
            attempt: 0,
            depth: 0,
            discovered_at,
            not_before: None,
        }
    }

    pub fn with_hint(mut self, hint: RouteHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn hint(&self) -> Option<&RouteHint> {
        self.hint.as_ref()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// Politeness key: host plus explicit port, or the whole URL for host-less schemes.
    pub fn host_key(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => self.url.as_str().to_string(),
        }
    }

    /// Same task, not to be dispatched before `instant`.
    pub fn deferred(&self, instant: DateTime<Utc>) -> Self {
        Self {
            not_before: Some(instant),
            ..self.clone()
        }
    }

    /// Next attempt after a failure. Any held politeness slot is dropped.
    pub fn retried(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            not_before: None,
            ..self.clone()
        }
    }

    /// A task discovered from this one's page. Hints are not inherited.
    pub fn child(&self, id: TaskId, url: Url, discovered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url,
            hint: None,
            attempt: 0,
            depth: self.depth.saturating_add(1),
            discovered_at,
            not_before: None,
        }
    }
}

impl fmt::Display for CrawlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.url)
    }
}
