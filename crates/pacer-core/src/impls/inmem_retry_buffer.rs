//! InMemoryRetryBuffer - ロック付き min-heap
//!
//! key は `(not_before, seq)`。seq は挿入順の単調増加カウンタで、
//! 同時刻のエントリを挿入順に並べます。

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{CrawlTask, PacerError};
use crate::ports::RetryBuffer;

/// Scheduled task entry for the heap.
///
/// Ordering is reversed so `BinaryHeap` acts as a min-heap (earliest first).
#[derive(Debug)]
struct ScheduledTask {
    not_before: DateTime<Utc>,
    seq: u64,
    task: CrawlTask,
    reason: String,
    cause: Option<String>,
}

impl PartialEq for ScheduledTask {
    fn eq(&self, other: &Self) -> bool {
        self.not_before == other.not_before && self.seq == other.seq
    }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reverse ordering: earlier times (then lower seq) have higher priority
        other
            .not_before
            .cmp(&self.not_before)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Why a task is waiting, for status views.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRetry {
    pub url: String,
    pub not_before: DateTime<Utc>,
    pub reason: String,
    pub cause: Option<String>,
}

#[derive(Default)]
pub struct InMemoryRetryBuffer {
    heap: Mutex<BinaryHeap<ScheduledTask>>,
    next_seq: AtomicU64,
}

impl InMemoryRetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of pending entries, earliest first.
    pub fn pending(&self) -> Vec<PendingRetry> {
        let heap = self.heap.lock();
        let mut entries: Vec<&ScheduledTask> = heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
            .into_iter()
            .map(|e| PendingRetry {
                url: e.task.url().to_string(),
                not_before: e.not_before,
                reason: e.reason.clone(),
                cause: e.cause.clone(),
            })
            .collect()
    }
}

impl RetryBuffer for InMemoryRetryBuffer {
    fn schedule(
        &self,
        task: CrawlTask,
        not_before: DateTime<Utc>,
        reason: &str,
        cause: Option<&PacerError>,
    ) -> Result<(), PacerError> {
        let entry = ScheduledTask {
            not_before,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            task,
            reason: reason.to_string(),
            cause: cause.map(ToString::to_string),
        };
        self.heap.lock().push(entry);
        Ok(())
    }

    fn drain_ready(
        &self,
        now: DateTime<Utc>,
        max_batch: usize,
    ) -> Result<Vec<CrawlTask>, PacerError> {
        if max_batch == 0 {
            return Ok(Vec::new());
        }

        let mut heap = self.heap.lock();
        let mut ready = Vec::new();
        while ready.len() < max_batch {
            match heap.peek() {
                Some(entry) if entry.not_before <= now => {}
                _ => break, // Heap is sorted, so we can stop
            }
            if let Some(entry) = heap.pop() {
                ready.push(entry.task);
            }
        }
        Ok(ready)
    }

    fn peek_eligible_at(&self) -> Result<Option<DateTime<Utc>>, PacerError> {
        Ok(self.heap.lock().peek().map(|entry| entry.not_before))
    }

    fn size(&self) -> Result<usize, PacerError> {
        Ok(self.heap.lock().len())
    }
}
