//! Runner - scheduler を回し、pipeline を並列に実行するループ
//!
//! # フロー
//! 1. `Scheduler::next_decision()` で次の判断を取る
//! 2. `TaskReady` → worker（JoinSet 上の tokio task）に渡す
//! 3. worker: route 解決 → pipeline 実行 → 成功なら discovery、失敗なら RetryPolicy
//! 4. `Park` → sleep（worker 完了 / Notify / shutdown で早起き）
//! 5. `Drained` かつ in-flight なし → 終了
//!
//! store のエラーは致命的で、`run` が `Err` で終わります。

use std::sync::Arc;

use tokio::sync::{Notify, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

use super::status::{RunStats, RunSummary};
use crate::domain::{CrawlTask, PacerError, RetryDecision, ScheduleDecision};
use crate::policy::RetryPolicy;
use crate::ports::{
    Clock, DeadLetter, DeadLetterSink, Frontier, IdGenerator, RetryBuffer, SeenStore,
};
use crate::routing::{ProcessingContext, RouteResolver, RunContext};
use crate::scheduler::Scheduler;

/// Dead-letter reason for tasks no route accepts.
pub const NO_ROUTE_REASON: &str = "no route";

/// Everything a worker needs to take one task to a terminal state or back to a buffer.
pub(crate) struct Worker {
    pub(crate) frontier: Arc<dyn Frontier>,
    pub(crate) retry_buffer: Arc<dyn RetryBuffer>,
    pub(crate) resolver: Arc<RouteResolver>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) seen: Arc<dyn SeenStore>,
    pub(crate) dead_letters: Arc<dyn DeadLetterSink>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) run: Arc<RunContext>,
    pub(crate) stats: Arc<RunStats>,
    pub(crate) max_depth: Option<u32>,
    pub(crate) wake: Arc<Notify>,
}

impl Worker {
    async fn process(&self, task: CrawlTask) -> Result<(), PacerError> {
        let Some(route) = self.resolver.resolve(&task, &self.run) else {
            self.stats.record_unrouted();
            warn!(task = %task.id(), url = %task.url(), "no route matches");
            return self.dead_letter(task, NO_ROUTE_REASON.to_string(), None);
        };

        let mut ctx = ProcessingContext::new(task.clone(), Arc::clone(&self.run));
        match route.pipeline().execute(&mut ctx).await {
            Ok(result) => {
                debug!(
                    task = %task.id(),
                    route = route.id(),
                    code = %result.code,
                    stage = %result.stage_id,
                    "processed"
                );
                self.seen.mark_processed(task.url()).await?;
                self.stats.record_processed();
                self.discover(&task, ctx.discovered_links()).await
            }
            Err(err) => self.on_failure(task, err).await,
        }
    }

    async fn discover(&self, parent: &CrawlTask, links: &[Url]) -> Result<(), PacerError> {
        if links.is_empty() {
            return Ok(());
        }
        if let Some(max) = self.max_depth
            && parent.depth() >= max
        {
            debug!(task = %parent.id(), depth = parent.depth(), "max depth reached, links dropped");
            return Ok(());
        }

        let now = self.clock.now();
        let mut offered = 0;
        for link in links {
            if !self.seen.mark_discovered(link).await? {
                continue;
            }
            let child = parent.child(self.ids.generate_task_id(), link.clone(), now);
            self.frontier.offer(child)?;
            offered += 1;
        }

        if offered > 0 {
            debug!(task = %parent.id(), offered, "links discovered");
            self.stats.record_discovered(offered);
            self.wake.notify_one();
        }
        Ok(())
    }

    async fn on_failure(&self, task: CrawlTask, err: PacerError) -> Result<(), PacerError> {
        let now = self.clock.now();
        match self.retry_policy.on_failure(&task, &err, now) {
            RetryDecision::Retry { not_before, reason } => {
                debug!(task = %task.id(), attempt = task.attempt(), error = %err, %reason, "retry");
                self.retry_buffer
                    .schedule(task.retried(), not_before, &reason, Some(&err))?;
                self.stats.record_retried();
                self.wake.notify_one();
                Ok(())
            }
            RetryDecision::DeadLetter { reason } => {
                self.dead_letter(task, reason, Some(err.to_string()))
            }
            RetryDecision::Discard { reason } => {
                info!(task = %task.id(), url = %task.url(), %reason, "discarded");
                self.stats.record_discarded();
                Ok(())
            }
        }
    }

    fn dead_letter(
        &self,
        task: CrawlTask,
        reason: String,
        error: Option<String>,
    ) -> Result<(), PacerError> {
        self.dead_letters.record(DeadLetter {
            task,
            reason,
            error,
            recorded_at: self.clock.now(),
        })?;
        self.stats.record_dead_lettered();
        Ok(())
    }
}

/// Pull loop driving the scheduler with a bounded worker pool.
pub struct Runner {
    scheduler: Scheduler,
    worker: Arc<Worker>,
    concurrency: usize,
}

impl Runner {
    pub(crate) fn new(scheduler: Scheduler, worker: Worker, concurrency: usize) -> Self {
        Self {
            scheduler,
            worker: Arc::new(worker),
            concurrency: concurrency.max(1),
        }
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.worker.stats
    }

    pub fn run_context(&self) -> &Arc<RunContext> {
        &self.worker.run
    }

    /// Run until the frontier and the retry buffer are drained.
    pub async fn run(&self) -> Result<RunSummary, PacerError> {
        let (_keep_open, shutdown_rx) = watch::channel(false);
        self.run_until(shutdown_rx).await
    }

    /// Run on a background task that can be asked to stop.
    pub fn spawn(self: Arc<Self>) -> RunnerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run_until(shutdown_rx).await });
        RunnerHandle { shutdown_tx, join }
    }

    /// Run until drained or until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// After shutdown no new task is dispatched; in-flight tasks finish before returning.
    pub async fn run_until(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary, PacerError> {
        let run = &self.worker.run;
        info!(run = %run.run_id(), name = run.name(), concurrency = self.concurrency, "run started");

        let mut in_flight: JoinSet<Result<(), PacerError>> = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                break;
            }
            while let Some(joined) = in_flight.try_join_next() {
                settle(joined)?;
            }

            if in_flight.len() >= self.concurrency {
                tokio::select! {
                    Some(joined) = in_flight.join_next() => settle(joined)?,
                    changed = shutdown.changed() => if changed.is_err() { break },
                }
                continue;
            }

            match self.scheduler.next_decision()? {
                ScheduleDecision::TaskReady(task) => {
                    self.worker.stats.record_dispatched();
                    let worker = Arc::clone(&self.worker);
                    in_flight.spawn(async move { worker.process(task).await });
                }
                ScheduleDecision::Drained => {
                    if in_flight.is_empty() {
                        break;
                    }
                    // a running task may still discover links or schedule a retry
                    tokio::select! {
                        Some(joined) = in_flight.join_next() => settle(joined)?,
                        changed = shutdown.changed() => if changed.is_err() { break },
                    }
                }
                ScheduleDecision::Park { duration, .. } => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {}
                        _ = self.worker.wake.notified() => {}
                        Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => settle(joined)?,
                        changed = shutdown.changed() => if changed.is_err() { break },
                    }
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            settle(joined)?;
        }

        let summary = self.worker.stats.snapshot();
        info!(
            run = %run.run_id(),
            processed = summary.processed,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            discarded = summary.discarded,
            "run finished"
        );
        Ok(summary)
    }
}

fn settle(joined: Result<Result<(), PacerError>, JoinError>) -> Result<(), PacerError> {
    joined.map_err(|e| PacerError::Worker(e.to_string()))?
}

/// Handle to a spawned runner.
/// - `request_shutdown()` で新規 dispatch を止める（実行中の task は最後まで走る）
/// - `join()` / `shutdown_and_join()` で集計を受け取る
pub struct RunnerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<Result<RunSummary, PacerError>>,
}

impl RunnerHandle {
    pub fn request_shutdown(&self) {
        // the runner may already have finished and dropped its receiver
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn join(self) -> Result<RunSummary, PacerError> {
        let RunnerHandle { shutdown_tx, join } = self;
        let result = join.await;
        drop(shutdown_tx);
        result.map_err(|e| PacerError::Worker(e.to_string()))?
    }

    pub async fn shutdown_and_join(self) -> Result<RunSummary, PacerError> {
        self.request_shutdown();
        self.join().await
    }
}
