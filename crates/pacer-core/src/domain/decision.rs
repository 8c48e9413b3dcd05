//! Decision model: what the scheduler and the retry policy hand back to the runner.
//!
//! Both enums are closed: the runner matches exhaustively, so adding a variant is a
//! compile error everywhere a decision is consumed.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::CrawlTask;

/// Outcome of one `Scheduler::next_decision` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleDecision {
    /// Dispatch this task now.
    TaskReady(CrawlTask),

    /// Nothing is admissible yet. Sleep at most `duration` (hint, not a contract).
    Park {
        duration: Duration,
        wake_up_at: DateTime<Utc>,
    },

    /// Frontier and retry buffer are both empty.
    Drained,
}

impl ScheduleDecision {
    pub fn is_drained(&self) -> bool {
        matches!(self, ScheduleDecision::Drained)
    }
}

/// Disposition of a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Put the task back into the retry buffer.
    Retry {
        not_before: DateTime<Utc>,
        reason: String,
    },

    /// Give up and keep a permanent failure record.
    DeadLetter { reason: String },

    /// Drop silently.
    Discard { reason: String },
}

impl RetryDecision {
    pub fn reason(&self) -> &str {
        match self {
            RetryDecision::Retry { reason, .. }
            | RetryDecision::DeadLetter { reason }
            | RetryDecision::Discard { reason } => reason,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RetryDecision::Retry { .. })
    }
}
