use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::domain::{CrawlTask, RunId};
use crate::ports::{FetchResult, ParseOutput};

/// Run-wide facts route predicates may look at.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    name: String,
    started_at: DateTime<Utc>,
    labels: HashMap<String, String>,
}

impl RunContext {
    pub fn new(run_id: RunId, name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            name: name.into(),
            started_at,
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Per-task scratch space threaded through a pipeline's steps.
#[derive(Debug)]
pub struct ProcessingContext {
    task: CrawlTask,
    run: Arc<RunContext>,
    attributes: HashMap<String, serde_json::Value>,
    fetched: Option<FetchResult>,
    parsed: Option<ParseOutput>,
    trail: Vec<String>,
}

impl ProcessingContext {
    pub fn new(task: CrawlTask, run: Arc<RunContext>) -> Self {
        Self {
            task,
            run,
            attributes: HashMap::new(),
            fetched: None,
            parsed: None,
            trail: Vec::new(),
        }
    }

    pub fn task(&self) -> &CrawlTask {
        &self.task
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    pub fn store_fetch(&mut self, result: FetchResult) {
        self.fetched = Some(result);
    }

    pub fn fetched(&self) -> Option<&FetchResult> {
        self.fetched.as_ref()
    }

    pub fn store_parse(&mut self, output: ParseOutput) {
        self.parsed = Some(output);
    }

    pub fn parsed(&self) -> Option<&ParseOutput> {
        self.parsed.as_ref()
    }

    /// Links found by the parse step, empty if nothing was parsed.
    pub fn discovered_links(&self) -> &[Url] {
        self.parsed.as_ref().map_or(&[], |p| p.links.as_slice())
    }

    pub(crate) fn record_step(&mut self, name: &str) {
        self.trail.push(name.to_string());
    }

    /// Names of the steps executed so far, in order.
    pub fn trail(&self) -> &[String] {
        &self.trail
    }
}
