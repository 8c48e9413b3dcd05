//! Pipelines: ordered, short-circuiting step sequences.
//!
//! A step may return a verdict (`PipelineResult`) or nothing. After every verdict the
//! pipeline's `FlowControl` decides whether to stop. The default, `StopOnCode`, stops
//! on the code `"STOP"` compared case-insensitively and lets everything else through.
//! Branching on other codes is meant to plug in as another `FlowControl`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ProcessingContext;
use crate::domain::PacerError;

pub const CODE_OK: &str = "OK";
pub const CODE_STOP: &str = "STOP";
pub const CODE_CONTINUE: &str = "CONTINUE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub code: String,
    pub stage_id: String,
}

impl PipelineResult {
    pub fn new(code: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            stage_id: stage_id.into(),
        }
    }

    pub fn ok(stage_id: impl Into<String>) -> Self {
        Self::new(CODE_OK, stage_id)
    }

    pub fn stop(stage_id: impl Into<String>) -> Self {
        Self::new(CODE_STOP, stage_id)
    }

    pub fn proceed(stage_id: impl Into<String>) -> Self {
        Self::new(CODE_CONTINUE, stage_id)
    }

    pub fn is_stop(&self) -> bool {
        self.code.eq_ignore_ascii_case(CODE_STOP)
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn id(&self) -> &str;

    /// Transient failures surface as `Err`; the runner hands them to the retry policy.
    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<PipelineResult, PacerError>;
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)`: no verdict, keep going.
    async fn run(&self, ctx: &mut ProcessingContext) -> Result<Option<PipelineResult>, PacerError>;
}

/// Decides whether a verdict ends the pipeline.
pub trait FlowControl: Send + Sync {
    fn should_stop(&self, result: &PipelineResult) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnCode;

impl FlowControl for StopOnCode {
    fn should_stop(&self, result: &PipelineResult) -> bool {
        result.is_stop()
    }
}

pub struct StepsPipeline {
    id: String,
    steps: Vec<Arc<dyn Step>>,
    flow: Arc<dyn FlowControl>,
}

impl StepsPipeline {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
            flow: Arc::new(StopOnCode),
        }
    }

    pub fn step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_flow_control(mut self, flow: Arc<dyn FlowControl>) -> Self {
        self.flow = flow;
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl Pipeline for StepsPipeline {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<PipelineResult, PacerError> {
        let mut last = None;
        for step in &self.steps {
            ctx.record_step(step.name());
            let Some(result) = step.run(ctx).await? else {
                continue;
            };
            if self.flow.should_stop(&result) {
                trace!(pipeline = %self.id, step = step.name(), code = %result.code, "pipeline stopped");
                return Ok(result);
            }
            last = Some(result);
        }
        Ok(last.unwrap_or_else(|| PipelineResult::ok("pipeline")))
    }
}

/// Runs a whole pipeline as one step of another.
pub struct PipelineStep {
    name: String,
    pipeline: Arc<dyn Pipeline>,
}

impl PipelineStep {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            name: pipeline.id().to_string(),
            pipeline,
        }
    }
}

#[async_trait]
impl Step for PipelineStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<Option<PipelineResult>, PacerError> {
        self.pipeline.execute(ctx).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlTask, RunId, TaskId};
    use crate::routing::RunContext;
    use chrono::Utc;
    use url::Url;

    struct Fixed {
        name: &'static str,
        verdict: Option<&'static str>,
    }

    #[async_trait]
    impl Step for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(
            &self,
            _ctx: &mut ProcessingContext,
        ) -> Result<Option<PipelineResult>, PacerError> {
            Ok(self.verdict.map(|code| PipelineResult::new(code, self.name)))
        }
    }

    struct Failing;

    #[async_trait]
    impl Step for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(
            &self,
            _ctx: &mut ProcessingContext,
        ) -> Result<Option<PipelineResult>, PacerError> {
            Err(PacerError::step("failing", "boom"))
        }
    }

    fn step(name: &'static str, verdict: Option<&'static str>) -> Arc<dyn Step> {
        Arc::new(Fixed { name, verdict })
    }

    fn ctx() -> ProcessingContext {
        let task = CrawlTask::new(
            TaskId::generate(),
            Url::parse("https://example.com/").unwrap(),
            Utc::now(),
        );
        let run = RunContext::new(RunId::generate(), "test", Utc::now());
        ProcessingContext::new(task, Arc::new(run))
    }

    #[tokio::test]
    async fn stop_short_circuits() {
        let pipeline = StepsPipeline::new("p")
            .step(step("a", Some("OK")))
            .step(step("b", Some("STOP")))
            .step(step("c", Some("OK")));
        let mut ctx = ctx();

        let result = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(result, PipelineResult::stop("b"));
        assert_eq!(ctx.trail(), ["a", "b"]);
    }

    #[tokio::test]
    async fn stop_is_case_insensitive() {
        let pipeline = StepsPipeline::new("p")
            .step(step("a", Some("sToP")))
            .step(step("b", Some("OK")));
        let mut ctx = ctx();

        let result = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(result.code, "sToP");
        assert_eq!(ctx.trail(), ["a"]);
    }

    #[tokio::test]
    async fn last_verdict_wins_when_nothing_stops() {
        let pipeline = StepsPipeline::new("p")
            .step(step("a", Some("OK")))
            .step(step("b", Some("SKIPPED")))
            .step(step("c", None));
        let mut ctx = ctx();

        let result = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(result, PipelineResult::new("SKIPPED", "b"));
        assert_eq!(ctx.trail(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn no_verdict_synthesizes_ok() {
        let empty = StepsPipeline::new("empty");
        assert_eq!(
            empty.execute(&mut ctx()).await.unwrap(),
            PipelineResult::ok("pipeline")
        );

        let silent = StepsPipeline::new("silent").step(step("a", None));
        assert_eq!(
            silent.execute(&mut ctx()).await.unwrap(),
            PipelineResult::ok("pipeline")
        );
    }

    #[tokio::test]
    async fn step_error_propagates_and_stops() {
        let pipeline = StepsPipeline::new("p")
            .step(Arc::new(Failing))
            .step(step("after", Some("OK")));
        let mut ctx = ctx();

        let err = pipeline.execute(&mut ctx).await.unwrap_err();

        assert!(matches!(err, PacerError::Step { .. }));
        assert_eq!(ctx.trail(), ["failing"]);
    }

    struct StopOnSkip;

    impl FlowControl for StopOnSkip {
        fn should_stop(&self, result: &PipelineResult) -> bool {
            result.code == "SKIP"
        }
    }

    #[tokio::test]
    async fn flow_control_is_pluggable() {
        let pipeline = StepsPipeline::new("p")
            .with_flow_control(Arc::new(StopOnSkip))
            .step(step("a", Some("STOP")))
            .step(step("b", Some("SKIP")))
            .step(step("c", Some("OK")));
        let mut ctx = ctx();

        let result = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(result, PipelineResult::new("SKIP", "b"));
        assert_eq!(ctx.trail(), ["a", "b"]);
    }

    #[tokio::test]
    async fn nested_pipeline_runs_as_a_step() {
        let inner: Arc<dyn Pipeline> =
            Arc::new(StepsPipeline::new("inner").step(step("x", Some("STOP"))));
        let outer = StepsPipeline::new("outer")
            .step(Arc::new(PipelineStep::new(inner)))
            .step(step("y", Some("OK")));
        let mut ctx = ctx();

        let result = outer.execute(&mut ctx).await.unwrap();

        // the inner STOP surfaces as the step's verdict and stops the outer pipeline too
        assert_eq!(result, PipelineResult::stop("x"));
        assert_eq!(ctx.trail(), ["inner", "x"]);
    }
}
