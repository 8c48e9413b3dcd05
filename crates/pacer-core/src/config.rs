//! Configuration loaded from TOML.
//!
//! ```toml
//! [scheduler]
//! retry_drain_batch = 64
//! scan_frontier_batch = 128
//! max_park_ms = 1000
//!
//! [politeness]
//! per_host_min_delay_ms = 500
//! global_max_rps = 20.0
//!
//! [retry]
//! max_attempts = 5
//!
//! [workers]
//! concurrency = 8
//! ```
//!
//! Every field has a default, so an empty file is a valid config.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::PacerError;
use crate::policy::{
    BackoffRetryPolicy, CompositePoliteness, GlobalRps, NoopPoliteness, PerHostMinDelay,
    PolitenessPolicy,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub scheduler: SchedulerConfig,
    pub politeness: PolitenessConfig,
    pub retry: RetryConfig,
    pub workers: WorkerConfig,
    pub crawl: CrawlConfig,
}

impl PacerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PacerError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PacerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Fail fast on values no component could run with.
    pub fn validate(&self) -> Result<(), PacerError> {
        if let Some(rps) = self.politeness.global_max_rps
            && (!rps.is_finite() || rps <= 0.0)
        {
            return Err(PacerError::Config(format!(
                "politeness.global_max_rps must be > 0, got {rps}"
            )));
        }
        if self.workers.concurrency == 0 {
            return Err(PacerError::Config("workers.concurrency must be >= 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PacerError::Config("retry.max_attempts must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(PacerError::Config(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.retry.jitter
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Max tasks moved from the retry buffer to the frontier per tick (floored to 1).
    pub retry_drain_batch: usize,
    /// Max frontier tasks examined per tick (floored to 1).
    pub scan_frontier_batch: usize,
    pub max_park_ms: u64,
    /// Park used when work exists but nothing says when it becomes eligible.
    pub fallback_park_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_drain_batch: 64,
            scan_frontier_batch: 128,
            max_park_ms: 1_000,
            fallback_park_ms: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn retry_drain_batch(&self) -> usize {
        self.retry_drain_batch.max(1)
    }

    pub fn scan_frontier_batch(&self) -> usize {
        self.scan_frontier_batch.max(1)
    }

    pub fn max_park(&self) -> Duration {
        Duration::from_millis(self.max_park_ms)
    }

    pub fn fallback_park(&self) -> Duration {
        Duration::from_millis(self.fallback_park_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolitenessConfig {
    pub per_host_min_delay_ms: Option<u64>,
    pub global_max_rps: Option<f64>,
}

impl PolitenessConfig {
    /// Nothing configured → noop, one → that policy, both → composite.
    pub fn build(&self) -> Result<Arc<dyn PolitenessPolicy>, PacerError> {
        let mut policies: Vec<Arc<dyn PolitenessPolicy>> = Vec::new();
        if let Some(ms) = self.per_host_min_delay_ms {
            policies.push(Arc::new(PerHostMinDelay::new(Duration::from_millis(ms))));
        }
        if let Some(rps) = self.global_max_rps {
            policies.push(Arc::new(GlobalRps::new(rps)?));
        }

        Ok(match policies.len() {
            0 => Arc::new(NoopPoliteness),
            1 => policies.remove(0),
            _ => Arc::new(CompositePoliteness::new(policies)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = BackoffRetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    pub fn build(&self) -> BackoffRetryPolicy {
        BackoffRetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Max tasks in flight at once.
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub run_name: String,
    /// Links found deeper than this are not offered. `None` = unbounded.
    pub max_depth: Option<u32>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            run_name: "pacer".to_string(),
            max_depth: None,
        }
    }
}
