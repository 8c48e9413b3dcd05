//! DeadLetterSink port - 恒久的な失敗の記録

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{CrawlTask, PacerError};

/// One task that will not be attempted again.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub task: CrawlTask,
    pub reason: String,
    /// Rendered error, if the task died from one.
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

pub trait DeadLetterSink: Send + Sync {
    fn record(&self, letter: DeadLetter) -> Result<(), PacerError>;
}
