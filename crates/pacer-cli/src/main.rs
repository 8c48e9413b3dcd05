use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;
use async_trait::async_trait;
use clap::Parser as ClapParser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use pacer_core::impls::{InMemoryDeadLetters, JsonLinkParser, MapParserRegistry};
use pacer_core::ports::{FetchRequest, FetchResult, Fetcher};
use pacer_core::routing::{
    FetchParsePipeline, PipelineResult, PipelineStep, ProcessingContext, Route, Step,
    StepsPipeline,
};
use pacer_core::{AppBuilder, PacerConfig, PacerError, RouteHint, RunSummary};

const SEED_HINT: &str = "seed";

#[derive(Debug, ClapParser)]
#[command(name = "pacer", about = "Crawl a simulated site through the pacer scheduler")]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed URLs (default: the simulated site's first page)
    #[arg(long = "seed")]
    seeds: Vec<Url>,

    /// Number of pages on the simulated site
    #[arg(long, default_value_t = 20)]
    pages: u32,

    /// Every n-th fetch fails with HTTP 503 (0 = never)
    #[arg(long, default_value_t = 0)]
    fail_every: u64,

    #[arg(short, long)]
    verbose: bool,
}

/// Binary-tree shaped site spread over two hosts: page n links to 2n+1, 2n+2 and back to n/2.
struct SimulatedSite {
    pages: u32,
    fail_every: u64,
    fetches: AtomicU64,
}

impl SimulatedSite {
    fn page_url(n: u32) -> String {
        format!("https://site{}.sim.test/page/{n}", n % 2)
    }

    fn page_number(url: &Url) -> Option<u32> {
        url.path().strip_prefix("/page/")?.parse().ok()
    }
}

#[async_trait]
impl Fetcher for SimulatedSite {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, PacerError> {
        let fetch_no = self.fetches.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && fetch_no % self.fail_every == 0 {
            return Ok(FetchResult {
                url: request.url,
                status: 503,
                content_type: None,
                body: Vec::new(),
            });
        }

        let Some(n) = Self::page_number(&request.url).filter(|n| *n < self.pages) else {
            return Ok(FetchResult {
                url: request.url,
                status: 404,
                content_type: None,
                body: Vec::new(),
            });
        };

        let links: Vec<String> = [2 * n + 1, 2 * n + 2, n / 2]
            .into_iter()
            .filter(|m| *m < self.pages)
            .map(Self::page_url)
            .collect();
        let body = serde_json::json!({
            "links": links,
            "items": [{ "page": n, "title": format!("Page {n}") }],
        });

        Ok(FetchResult {
            url: request.url,
            status: 200,
            content_type: Some("application/json".to_string()),
            body: serde_json::to_vec(&body)
                .map_err(|e| PacerError::step("simulate", e.to_string()))?,
        })
    }
}

/// Counts parsed items into a shared counter.
struct CollectItems {
    items: Arc<AtomicU64>,
}

#[async_trait]
impl Step for CollectItems {
    fn name(&self) -> &str {
        "collect-items"
    }

    async fn run(&self, ctx: &mut ProcessingContext) -> Result<Option<PipelineResult>, PacerError> {
        let count = ctx.parsed().map_or(0, |p| p.items.len());
        self.items.fetch_add(count as u64, Ordering::Relaxed);
        ctx.set_attribute("items", serde_json::json!(count));
        Ok(Some(PipelineResult::ok(self.name())))
    }
}

#[derive(Debug, Serialize)]
struct Report {
    run: String,
    summary: RunSummary,
    items: u64,
    dead_letters: Vec<DeadLetterLine>,
}

#[derive(Debug, Serialize)]
struct DeadLetterLine {
    url: String,
    reason: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "pacer_core=debug,pacer=debug"
    } else {
        "pacer_core=info,pacer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => PacerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PacerConfig::default(),
    };

    let site = Arc::new(SimulatedSite {
        pages: cli.pages,
        fail_every: cli.fail_every,
        fetches: AtomicU64::new(0),
    });
    let parsers = Arc::new(
        MapParserRegistry::new().register("application/json", Arc::new(JsonLinkParser)),
    );
    let items = Arc::new(AtomicU64::new(0));
    let pipeline = Arc::new(
        StepsPipeline::new("page")
            .step(Arc::new(PipelineStep::new(Arc::new(FetchParsePipeline::new(
                "fetch-parse",
                site,
                parsers,
            )))))
            .step(Arc::new(CollectItems {
                items: Arc::clone(&items),
            })),
    );
    let dead_letters = Arc::new(InMemoryDeadLetters::new());

    let app = AppBuilder::new()
        .config(config)
        .route(Route::new("seed", pipeline.clone()).with_hints([SEED_HINT]))
        .route(Route::new("pages", pipeline).catch_all())
        .expect_routes(&["seed", "pages"])
        .dead_letters(dead_letters.clone())
        .build()?;

    let seeds = if cli.seeds.is_empty() {
        vec![Url::parse(&SimulatedSite::page_url(0))?]
    } else {
        cli.seeds
    };
    for seed in seeds {
        app.seed_with_hint(seed, RouteHint::new(SEED_HINT)).await?;
    }

    let summary = app.run().await?;
    info!(processed = summary.processed, "crawl complete");

    let report = Report {
        run: app.run_context().run_id().to_string(),
        summary,
        items: items.load(Ordering::Relaxed),
        dead_letters: dead_letters
            .snapshot()
            .into_iter()
            .map(|letter| DeadLetterLine {
                url: letter.task.url().to_string(),
                reason: letter.reason,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
