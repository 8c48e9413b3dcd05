//! Retry policy: decides what happens to a task whose pipeline failed.
//!
//! `RetryPolicy` is a pure function (task + error + now → decision); applying the
//! decision (re-buffer, dead-letter, drop) is the runner's job.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::domain::{CrawlTask, ErrorKind, PacerError, RetryDecision};

pub trait RetryPolicy: Send + Sync {
    fn on_failure(&self, task: &CrawlTask, error: &PacerError, now: DateTime<Utc>)
    -> RetryDecision;
}

/// Attempt-capped exponential backoff.
///
/// - unsupported content (no parser) is discarded
/// - permanent errors are dead-lettered right away
/// - otherwise retry until `max_attempts`, then dead-letter
#[derive(Debug, Clone)]
pub struct BackoffRetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Spread each delay by up to `± jitter * delay`. `0.0` disables it.
    pub jitter: f64,
}

impl Default for BackoffRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter: 0.0,
        }
    }
}

impl BackoffRetryPolicy {
    /// Delay before retrying after `failures` failed attempts (1-indexed).
    ///
    /// delay = base_delay * multiplier^(failures - 1), capped at `max_delay`.
    ///
    /// With base_delay=2s, multiplier=2.0: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = self.jitter.min(1.0);
            capped * rand::thread_rng().gen_range((1.0 - spread)..=(1.0 + spread))
        } else {
            capped
        };

        if jittered.is_finite() && jittered > 0.0 {
            Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
        } else {
            Duration::ZERO
        }
    }
}

impl RetryPolicy for BackoffRetryPolicy {
    fn on_failure(
        &self,
        task: &CrawlTask,
        error: &PacerError,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if let PacerError::ParserNotFound(content_type) = error {
            return RetryDecision::Discard {
                reason: format!("unsupported content type '{content_type}'"),
            };
        }

        if error.kind() == ErrorKind::Permanent {
            return RetryDecision::DeadLetter {
                reason: format!("permanent failure: {error}"),
            };
        }

        let failures = task.attempt().saturating_add(1);
        if failures >= self.max_attempts {
            return RetryDecision::DeadLetter {
                reason: format!("Max attempts reached: {failures}/{}", self.max_attempts),
            };
        }

        let delay = self.next_delay(failures);
        let not_before = now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        RetryDecision::Retry {
            not_before,
            reason: format!(
                "Retry attempt {}/{} after {:?}",
                failures + 1,
                self.max_attempts,
                delay
            ),
        }
    }
}
