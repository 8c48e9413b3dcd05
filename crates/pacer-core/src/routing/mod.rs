//! Routing - task から pipeline を選び、実行する
//!
//! `RouteResolver` が hint（fast path）または predicate で `Route` を選び、
//! その `Pipeline` が `ProcessingContext` に対して step を順に実行します。

pub mod context;
pub mod fetch_parse;
pub mod pipeline;
pub mod route;

pub use context::{ProcessingContext, RunContext};
pub use fetch_parse::FetchParsePipeline;
pub use pipeline::{
    FlowControl, Pipeline, PipelineResult, PipelineStep, Step, StepsPipeline, StopOnCode,
};
pub use route::{Route, RouteResolver};
