//! # Scheduler
//!
//! Admission control for crawl tasks. Each `next_decision` call is one
//! non-blocking tick:
//!
//! 1. move up to `retry_drain_batch` due tasks from the retry buffer to the frontier;
//! 2. scan up to `scan_frontier_batch` frontier tasks, deferring the ones politeness
//!    holds back and returning the first one it admits;
//! 3. otherwise report `Drained` (no work anywhere) or `Park` until the earliest
//!    deferred task becomes eligible.
//!
//! The scheduler never sleeps and never catches collaborator errors: a failing
//! frontier or retry buffer ends the runner loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::app::status::RunStats;
use crate::config::SchedulerConfig;
use crate::domain::{PacerError, ScheduleDecision};
use crate::policy::PolitenessPolicy;
use crate::ports::{Clock, Frontier, RetryBuffer};

/// Retry-buffer reason for politeness deferrals.
pub const POLITENESS_REASON: &str = "politeness";

pub struct Scheduler {
    frontier: Arc<dyn Frontier>,
    retry_buffer: Arc<dyn RetryBuffer>,
    politeness: Arc<dyn PolitenessPolicy>,
    clock: Arc<dyn Clock>,
    retry_drain_batch: usize,
    scan_frontier_batch: usize,
    max_park: Duration,
    fallback_park: Duration,
    stats: Option<Arc<RunStats>>,
}

impl Scheduler {
    pub fn new(
        frontier: Arc<dyn Frontier>,
        retry_buffer: Arc<dyn RetryBuffer>,
        politeness: Arc<dyn PolitenessPolicy>,
        clock: Arc<dyn Clock>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            frontier,
            retry_buffer,
            politeness,
            clock,
            retry_drain_batch: config.retry_drain_batch(),
            scan_frontier_batch: config.scan_frontier_batch(),
            max_park: config.max_park(),
            fallback_park: config.fallback_park(),
            stats: None,
        }
    }

    /// Count deferrals and parks into `stats`.
    pub fn with_stats(mut self, stats: Arc<RunStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn frontier(&self) -> &Arc<dyn Frontier> {
        &self.frontier
    }

    pub fn retry_buffer(&self) -> &Arc<dyn RetryBuffer> {
        &self.retry_buffer
    }

    pub fn next_decision(&self) -> Result<ScheduleDecision, PacerError> {
        let now = self.clock.now();

        let due = self.retry_buffer.drain_ready(now, self.retry_drain_batch)?;
        if !due.is_empty() {
            trace!(count = due.len(), "retry buffer -> frontier");
        }
        for task in due {
            self.frontier.offer(task)?;
        }

        for _ in 0..self.scan_frontier_batch {
            let Some(task) = self.frontier.poll()? else {
                break;
            };

            // A due not_before is the slot reserved when the task was deferred; it is
            // not reserved again, only spaced against what went out since.
            let eligible_at = match task.not_before() {
                Some(reserved) if reserved <= now => self.politeness.admission_at(&task, now),
                _ => self.politeness.eligible_at(&task, now),
            };

            if eligible_at > now {
                debug!(
                    task = %task.id(),
                    url = %task.url(),
                    until = %eligible_at,
                    "politeness defer"
                );
                self.retry_buffer.schedule(
                    task.deferred(eligible_at),
                    eligible_at,
                    POLITENESS_REASON,
                    None,
                )?;
                if let Some(stats) = &self.stats {
                    stats.record_deferred();
                }
                continue;
            }

            self.politeness.record_dispatch(&task, now);
            trace!(task = %task.id(), url = %task.url(), "dispatch");
            return Ok(ScheduleDecision::TaskReady(task));
        }

        if self.frontier.size()? == 0 && self.retry_buffer.size()? == 0 {
            debug!("frontier and retry buffer drained");
            return Ok(ScheduleDecision::Drained);
        }

        let decision = match self.retry_buffer.peek_eligible_at()? {
            None => ScheduleDecision::Park {
                duration: self.fallback_park,
                wake_up_at: add(now, self.fallback_park),
            },
            Some(next) => ScheduleDecision::Park {
                duration: (next - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(self.max_park),
                wake_up_at: next,
            },
        };
        if let ScheduleDecision::Park {
            duration,
            wake_up_at,
        } = &decision
        {
            trace!(?duration, %wake_up_at, "park");
        }
        if let Some(stats) = &self.stats {
            stats.record_park();
        }
        Ok(decision)
    }
}

fn add(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(instant)
}
