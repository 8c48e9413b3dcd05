//! RetryBuffer port - 時刻順の待機バッファ
//!
//! politeness による先送りと失敗リトライの両方がここに入ります。

use chrono::{DateTime, Utc};

use crate::domain::{CrawlTask, PacerError};

/// RetryBuffer は not_before 順にタスクを保持
///
/// # 設計原則
/// - identity による重複排除はしない（同じタスクを二重に schedule しないのは呼び出し側の責任）
/// - drain は earliest-deadline-first（公平性）
pub trait RetryBuffer: Send + Sync {
    /// Insert `task`, eligible again at `not_before`.
    fn schedule(
        &self,
        task: CrawlTask,
        not_before: DateTime<Utc>,
        reason: &str,
        cause: Option<&PacerError>,
    ) -> Result<(), PacerError>;

    /// Remove and return up to `max_batch` tasks with `not_before <= now`, earliest first.
    fn drain_ready(
        &self,
        now: DateTime<Utc>,
        max_batch: usize,
    ) -> Result<Vec<CrawlTask>, PacerError>;

    /// Smallest pending `not_before`, if any.
    fn peek_eligible_at(&self) -> Result<Option<DateTime<Utc>>, PacerError>;

    fn size(&self) -> Result<usize, PacerError>;
}
