//! Domain model (IDs, tasks, decisions, errors).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod task;

pub use decision::{RetryDecision, ScheduleDecision};
pub use errors::{ErrorKind, PacerError};
pub use ids::{RunId, TaskId};
pub use task::{CrawlTask, RouteHint};
