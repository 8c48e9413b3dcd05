//! Policies: politeness (when may a task run) and retry (what to do after a failure).

pub mod politeness;
mod reservation;
pub mod retry;

pub use politeness::{
    CompositePoliteness, GlobalRps, NoopPoliteness, PerHostMinDelay, PolitenessPolicy,
};
pub use retry::{BackoffRetryPolicy, RetryPolicy};
