//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - route が 1 つもなければ BuildError
//! - expect_routes() の id が全て登録されているかを build() 時にチェック
//! - config の検証（rps, concurrency など）も build() で行う
//!
//! 差し替えなかった port は in-memory 実装と SystemClock で埋めます。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use url::Url;

use super::runner::{Runner, RunnerHandle, Worker};
use super::status::{RunStats, RunSummary};
use crate::config::PacerConfig;
use crate::domain::{CrawlTask, PacerError, RouteHint};
use crate::impls::{InMemoryDeadLetters, InMemoryFrontier, InMemoryRetryBuffer, InMemorySeenStore};
use crate::policy::{PolitenessPolicy, RetryPolicy};
use crate::ports::{
    Clock, DeadLetterSink, Frontier, IdGenerator, RetryBuffer, SeenStore, SystemClock,
    UlidGenerator,
};
use crate::routing::{Route, RouteResolver, RunContext};
use crate::scheduler::Scheduler;

/// AppBuilder は crawl を構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(PacerConfig::load("pacer.toml")?)
///     .route(Route::new("pages", pipeline).catch_all())
///     .expect_routes(&["pages"])
///     .build()?;
/// app.seed(Url::parse("https://example.com/")?).await?;
/// let summary = app.run().await?;
/// ```
pub struct AppBuilder {
    config: PacerConfig,
    routes: Vec<Route>,
    expected_routes: Option<Vec<String>>,
    clock: Option<Arc<dyn Clock>>,
    frontier: Option<Arc<dyn Frontier>>,
    retry_buffer: Option<Arc<dyn RetryBuffer>>,
    seen: Option<Arc<dyn SeenStore>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    politeness: Option<Arc<dyn PolitenessPolicy>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    labels: Vec<(String, String)>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No routes registered. Every task would be dead-lettered.")]
    NoRoutes,

    #[error("Missing routes: {0:?}. These routes were expected but not registered.")]
    MissingRoutes(Vec<String>),

    #[error(transparent)]
    Config(#[from] PacerError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: PacerConfig::default(),
            routes: Vec::new(),
            expected_routes: None,
            clock: None,
            frontier: None,
            retry_buffer: None,
            seen: None,
            dead_letters: None,
            politeness: None,
            retry_policy: None,
            labels: Vec::new(),
        }
    }

    pub fn config(mut self, config: PacerConfig) -> Self {
        self.config = config;
        self
    }

    /// Routes are matched in the order they are added.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn expect_routes(mut self, ids: &[&str]) -> Self {
        self.expected_routes = Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn frontier(mut self, frontier: Arc<dyn Frontier>) -> Self {
        self.frontier = Some(frontier);
        self
    }

    pub fn retry_buffer(mut self, retry_buffer: Arc<dyn RetryBuffer>) -> Self {
        self.retry_buffer = Some(retry_buffer);
        self
    }

    pub fn seen_store(mut self, seen: Arc<dyn SeenStore>) -> Self {
        self.seen = Some(seen);
        self
    }

    pub fn dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Overrides the policy built from `[politeness]`.
    pub fn politeness(mut self, policy: Arc<dyn PolitenessPolicy>) -> Self {
        self.politeness = Some(policy);
        self
    }

    /// Overrides the policy built from `[retry]`.
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Label visible to route predicates through `RunContext::label`.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        if self.routes.is_empty() {
            return Err(BuildError::NoRoutes);
        }
        if let Some(expected) = &self.expected_routes {
            let registered: Vec<&str> = self.routes.iter().map(Route::id).collect();
            let missing: Vec<String> = expected
                .iter()
                .filter(|id| !registered.contains(&id.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRoutes(missing));
            }
        }
        let resolver = Arc::new(RouteResolver::new(self.routes)?);

        let politeness = match self.politeness {
            Some(policy) => policy,
            None => self.config.politeness.build()?,
        };
        let retry_policy = self
            .retry_policy
            .unwrap_or_else(|| Arc::new(self.config.retry.build()));

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let frontier = self
            .frontier
            .unwrap_or_else(|| Arc::new(InMemoryFrontier::new()));
        let retry_buffer = self
            .retry_buffer
            .unwrap_or_else(|| Arc::new(InMemoryRetryBuffer::new()));
        let seen = self
            .seen
            .unwrap_or_else(|| Arc::new(InMemorySeenStore::new()));
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(InMemoryDeadLetters::new()));
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));

        let run = self.labels.into_iter().fold(
            RunContext::new(ids.generate_run_id(), &self.config.crawl.run_name, clock.now()),
            |run, (key, value)| run.with_label(key, value),
        );
        let stats = Arc::new(RunStats::default());

        let scheduler = Scheduler::new(
            Arc::clone(&frontier),
            Arc::clone(&retry_buffer),
            politeness,
            Arc::clone(&clock),
            &self.config.scheduler,
        )
        .with_stats(Arc::clone(&stats));

        let worker = Worker {
            frontier: Arc::clone(&frontier),
            retry_buffer,
            resolver,
            retry_policy,
            seen: Arc::clone(&seen),
            dead_letters,
            ids: Arc::clone(&ids),
            clock: Arc::clone(&clock),
            run: Arc::new(run),
            stats,
            max_depth: self.config.crawl.max_depth,
            wake: Arc::new(Notify::new()),
        };

        Ok(App {
            runner: Arc::new(Runner::new(
                scheduler,
                worker,
                self.config.workers.concurrency,
            )),
            frontier,
            seen,
            ids,
            clock,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は構築済みの crawl
pub struct App {
    runner: Arc<Runner>,
    frontier: Arc<dyn Frontier>,
    seen: Arc<dyn SeenStore>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl App {
    /// Offer a seed URL. Returns `false` if it was already discovered.
    pub async fn seed(&self, url: Url) -> Result<bool, PacerError> {
        self.offer_seed(url, None).await
    }

    /// Offer a seed URL that routes through `hint`.
    pub async fn seed_with_hint(&self, url: Url, hint: RouteHint) -> Result<bool, PacerError> {
        self.offer_seed(url, Some(hint)).await
    }

    async fn offer_seed(&self, url: Url, hint: Option<RouteHint>) -> Result<bool, PacerError> {
        if !self.seen.mark_discovered(&url).await? {
            return Ok(false);
        }
        let task = CrawlTask::new(self.ids.generate_task_id(), url, self.now());
        let task = match hint {
            Some(hint) => task.with_hint(hint),
            None => task,
        };
        self.frontier.offer(task)?;
        Ok(true)
    }

    pub async fn run(&self) -> Result<RunSummary, PacerError> {
        self.runner.run().await
    }

    pub fn spawn(&self) -> RunnerHandle {
        Arc::clone(&self.runner).spawn()
    }

    pub fn stats(&self) -> RunSummary {
        self.runner.stats().snapshot()
    }

    pub fn run_context(&self) -> &RunContext {
        self.runner.run_context()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use crate::routing::{Pipeline, StepsPipeline};
    use chrono::TimeZone;

    fn pipeline() -> Arc<dyn Pipeline> {
        Arc::new(StepsPipeline::new("noop"))
    }

    #[test]
    fn test_build_success() {
        let app = AppBuilder::new()
            .route(Route::new("pages", pipeline()).catch_all())
            .expect_routes(&["pages"])
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_no_routes() {
        let app = AppBuilder::new().build();
        assert!(matches!(app, Err(BuildError::NoRoutes)));
    }

    #[test]
    fn test_build_missing_routes() {
        let app = AppBuilder::new()
            .route(Route::new("pages", pipeline()).catch_all())
            .expect_routes(&["pages", "sitemaps"])
            .build();
        assert!(matches!(
            app,
            Err(BuildError::MissingRoutes(missing)) if missing == vec!["sitemaps".to_string()]
        ));
    }

    #[test]
    fn test_build_duplicate_route_ids() {
        let app = AppBuilder::new()
            .route(Route::new("pages", pipeline()).catch_all())
            .route(Route::new("pages", pipeline()))
            .build();
        assert!(matches!(app, Err(BuildError::Config(PacerError::Config(_)))));
    }

    #[test]
    fn test_build_invalid_config() {
        let mut config = PacerConfig::default();
        config.politeness.global_max_rps = Some(-1.0);
        let app = AppBuilder::new()
            .config(config)
            .route(Route::new("pages", pipeline()).catch_all())
            .build();
        assert!(matches!(app, Err(BuildError::Config(_))));
    }

    #[test]
    fn run_context_carries_name_labels_and_clock() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut config = PacerConfig::default();
        config.crawl.run_name = "nightly".into();
        let app = AppBuilder::new()
            .config(config)
            .clock(Arc::new(FixedClock::new(t0)))
            .label("tenant", "acme")
            .route(Route::new("pages", pipeline()).catch_all())
            .build()
            .unwrap();

        let run = app.run_context();
        assert_eq!(run.name(), "nightly");
        assert_eq!(run.label("tenant"), Some("acme"));
        assert_eq!(run.started_at(), t0);
        assert_eq!(run.run_id().as_ulid().timestamp_ms(), t0.timestamp_millis() as u64);
    }

    #[tokio::test]
    async fn seeding_twice_offers_once() {
        let app = AppBuilder::new()
            .route(Route::new("pages", pipeline()).catch_all())
            .build()
            .unwrap();
        let url = Url::parse("https://example.com/").unwrap();

        assert!(app.seed(url.clone()).await.unwrap());
        assert!(!app.seed(url).await.unwrap());

        let summary = app.run().await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(app.stats(), summary);
    }
}
