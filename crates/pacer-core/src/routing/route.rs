use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use super::{Pipeline, RunContext};
use crate::domain::{CrawlTask, PacerError};

type Predicate = dyn Fn(&CrawlTask, &RunContext) -> bool + Send + Sync;

/// Binds a pipeline to the tasks it should process.
///
/// A route is selected either through one of its hints or through its predicate.
/// Without `matching`, the predicate never matches and the route is hint-only.
pub struct Route {
    id: String,
    predicate: Arc<Predicate>,
    hints: HashSet<String>,
    pipeline: Arc<dyn Pipeline>,
}

impl Route {
    pub fn new(id: impl Into<String>, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            id: id.into(),
            predicate: Arc::new(|_: &CrawlTask, _: &RunContext| false),
            hints: HashSet::new(),
            pipeline,
        }
    }

    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CrawlTask, &RunContext) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Matches every task; put it last.
    pub fn catch_all(self) -> Self {
        self.matching(|_: &CrawlTask, _: &RunContext| true)
    }

    pub fn with_hints<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hints.extend(hints.into_iter().map(Into::into));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn matches(&self, task: &CrawlTask, run: &RunContext) -> bool {
        (self.predicate)(task, run)
    }

    pub fn supports_hint(&self, hint: &str) -> bool {
        self.hints.contains(hint)
    }

    pub fn pipeline(&self) -> &Arc<dyn Pipeline> {
        &self.pipeline
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("hints", &self.hints)
            .field("pipeline", &self.pipeline.id())
            .finish()
    }
}

/// First-match route selection with a hint fast path.
///
/// Routes keep declaration order. A hinted task goes to the first route supporting
/// that hint without any predicate being evaluated. Unhinted tasks, and hints no route
/// supports, fall through to the first route whose predicate matches.
#[derive(Debug)]
pub struct RouteResolver {
    routes: Vec<Arc<Route>>,
    by_hint: HashMap<String, usize>,
}

impl RouteResolver {
    pub fn new(routes: Vec<Route>) -> Result<Self, PacerError> {
        let mut ids = HashSet::new();
        let mut by_hint = HashMap::new();
        for (index, route) in routes.iter().enumerate() {
            if !ids.insert(route.id.as_str()) {
                return Err(PacerError::Config(format!("duplicate route id '{}'", route.id)));
            }
            for hint in &route.hints {
                by_hint.entry(hint.clone()).or_insert(index);
            }
        }

        Ok(Self {
            routes: routes.into_iter().map(Arc::new).collect(),
            by_hint,
        })
    }

    pub fn resolve(&self, task: &CrawlTask, run: &RunContext) -> Option<Arc<Route>> {
        if let Some(hint) = task.hint()
            && let Some(&index) = self.by_hint.get(hint.as_str())
        {
            let route = &self.routes[index];
            trace!(task = %task.id(), hint = hint.as_str(), route = %route.id, "route by hint");
            return Some(Arc::clone(route));
        }

        let route = self.routes.iter().find(|r| r.matches(task, run))?;
        trace!(task = %task.id(), route = %route.id, "route by predicate");
        Some(Arc::clone(route))
    }

    pub fn route_ids(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteHint, RunId, TaskId};
    use crate::routing::StepsPipeline;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    fn pipeline(id: &str) -> Arc<dyn Pipeline> {
        Arc::new(StepsPipeline::new(id))
    }

    fn task(url: &str, hint: Option<&str>) -> CrawlTask {
        let task = CrawlTask::new(TaskId::generate(), Url::parse(url).unwrap(), Utc::now());
        match hint {
            Some(h) => task.with_hint(RouteHint::new(h)),
            None => task,
        }
    }

    fn run() -> RunContext {
        RunContext::new(RunId::generate(), "test", Utc::now()).with_label("tenant", "acme")
    }

    fn resolver() -> RouteResolver {
        RouteResolver::new(vec![
            Route::new("listing", pipeline("listing")).with_hints(["listing", "index"]),
            Route::new("docs", pipeline("docs")).matching(|t, _| t.url().path().starts_with("/docs")),
            Route::new("listing-too", pipeline("listing-too")).with_hints(["listing"]),
            Route::new("acme", pipeline("acme")).matching(|_, run| run.label("tenant") == Some("acme")),
        ])
        .unwrap()
    }

    #[rstest]
    #[case::hint_first_supporter("https://a.example/x", Some("listing"), Some("listing"))]
    #[case::second_hint("https://a.example/x", Some("index"), Some("listing"))]
    #[case::predicate("https://a.example/docs/1", None, Some("docs"))]
    #[case::run_label("https://a.example/other", None, Some("acme"))]
    #[case::unknown_hint_falls_through("https://a.example/docs/2", Some("nope"), Some("docs"))]
    fn resolves(#[case] url: &str, #[case] hint: Option<&str>, #[case] expected: Option<&str>) {
        let route = resolver().resolve(&task(url, hint), &run());
        assert_eq!(route.as_ref().map(|r| r.id()), expected);
    }

    #[test]
    fn nothing_matches_is_none() {
        let resolver = RouteResolver::new(vec![
            Route::new("docs", pipeline("docs")).matching(|t, _| t.url().path() == "/docs"),
        ])
        .unwrap();
        let run = RunContext::new(RunId::generate(), "test", Utc::now());
        assert!(resolver.resolve(&task("https://a.example/", None), &run).is_none());
    }

    #[test]
    fn hinted_task_never_evaluates_predicates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolver = RouteResolver::new(vec![
            Route::new("any", pipeline("any")).matching(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }),
            Route::new("hinted", pipeline("hinted")).with_hints(["seed"]),
        ])
        .unwrap();

        let route = resolver.resolve(&task("https://a.example/", Some("seed")), &run());

        assert_eq!(route.unwrap().id(), "hinted");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolver.resolve(&task("https://a.example/", None), &run());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = RouteResolver::new(vec![
            Route::new("a", pipeline("p1")).catch_all(),
            Route::new("a", pipeline("p2")),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate route id 'a'"));
    }

    #[test]
    fn route_exposes_its_pipeline() {
        let resolver = resolver();
        let route = resolver.resolve(&task("https://a.example/docs", None), &run()).unwrap();
        assert_eq!(route.pipeline().id(), "docs");
        assert_eq!(resolver.route_ids(), ["listing", "docs", "listing-too", "acme"]);
    }
}
