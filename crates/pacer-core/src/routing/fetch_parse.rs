use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Pipeline, PipelineResult, ProcessingContext};
use crate::domain::PacerError;
use crate::ports::{FetchRequest, Fetcher, ParserRegistry};

/// Content type assumed when the response carries none.
const UNKNOWN_CONTENT_TYPE: &str = "application/octet-stream";

/// Fetch, pick a parser by content type, parse, keep both results in the context.
///
/// Returns `CONTINUE` so it can sit in front of further steps.
pub struct FetchParsePipeline {
    id: String,
    fetcher: Arc<dyn Fetcher>,
    parsers: Arc<dyn ParserRegistry>,
    timeout: Option<Duration>,
}

impl FetchParsePipeline {
    pub fn new(
        id: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        parsers: Arc<dyn ParserRegistry>,
    ) -> Self {
        Self {
            id: id.into(),
            fetcher,
            parsers,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Pipeline for FetchParsePipeline {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, ctx: &mut ProcessingContext) -> Result<PipelineResult, PacerError> {
        let mut request = FetchRequest::for_task(ctx.task());
        request.timeout = self.timeout;

        let page = self.fetcher.fetch(request).await?;
        if page.status >= 400 {
            return Err(PacerError::http(page.url.as_str(), page.status));
        }

        let content_type = page
            .content_type
            .clone()
            .unwrap_or_else(|| UNKNOWN_CONTENT_TYPE.to_string());
        let parser = self
            .parsers
            .resolve(&content_type)
            .ok_or_else(|| PacerError::ParserNotFound(content_type.clone()))?;

        let output = parser.parse(&page)?;
        debug!(
            pipeline = %self.id,
            url = %page.url,
            links = output.links.len(),
            items = output.items.len(),
            "page parsed"
        );

        ctx.store_fetch(page);
        ctx.store_parse(output);
        Ok(PipelineResult::proceed(self.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CrawlTask, ErrorKind, RunId, TaskId};
    use crate::impls::MapParserRegistry;
    use crate::ports::{FetchResult, ParseOutput, Parser};
    use crate::routing::RunContext;
    use chrono::Utc;
    use parking_lot::Mutex;
    use url::Url;

    struct CannedFetcher {
        status: u16,
        content_type: Option<&'static str>,
        body: &'static str,
        seen: Mutex<Vec<FetchRequest>>,
    }

    impl CannedFetcher {
        fn new(status: u16, content_type: Option<&'static str>, body: &'static str) -> Self {
            Self {
                status,
                content_type,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, PacerError> {
            let url = request.url.clone();
            self.seen.lock().push(request);
            Ok(FetchResult {
                url,
                status: self.status,
                content_type: self.content_type.map(str::to_string),
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    struct DownFetcher;

    #[async_trait]
    impl Fetcher for DownFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, PacerError> {
            Err(PacerError::transport(request.url.as_str(), "connection refused"))
        }
    }

    /// One link per non-empty line.
    struct LineLinks;

    impl Parser for LineLinks {
        fn parse(&self, page: &FetchResult) -> Result<ParseOutput, PacerError> {
            let links = page
                .body_text()
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| page.url.join(l.trim()).map_err(|e| PacerError::Parse(e.to_string())))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ParseOutput {
                links,
                items: Vec::new(),
            })
        }
    }

    fn registry() -> Arc<dyn ParserRegistry> {
        Arc::new(MapParserRegistry::new().register("text/plain", Arc::new(LineLinks)))
    }

    fn ctx() -> ProcessingContext {
        let task = CrawlTask::new(
            TaskId::generate(),
            Url::parse("https://example.com/dir/").unwrap(),
            Utc::now(),
        );
        let run = RunContext::new(RunId::generate(), "test", Utc::now());
        ProcessingContext::new(task, Arc::new(run))
    }

    #[tokio::test]
    async fn stores_fetch_and_parse_and_continues() {
        let fetcher = Arc::new(CannedFetcher::new(
            200,
            Some("text/plain; charset=utf-8"),
            "a\n/b\n",
        ));
        let pipeline = FetchParsePipeline::new("fetch", fetcher.clone(), registry())
            .with_timeout(Duration::from_secs(5));
        let mut ctx = ctx();

        let result = pipeline.execute(&mut ctx).await.unwrap();

        assert_eq!(result, PipelineResult::proceed("fetch"));
        assert!(!result.is_stop());
        assert_eq!(ctx.fetched().unwrap().status, 200);
        let links: Vec<&str> = ctx.discovered_links().iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            ["https://example.com/dir/a", "https://example.com/b"]
        );
        assert_eq!(
            fetcher.seen.lock()[0].timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn unknown_content_type_is_parser_not_found() {
        let fetcher = Arc::new(CannedFetcher::new(200, Some("image/png"), ""));
        let pipeline = FetchParsePipeline::new("fetch", fetcher, registry());
        let mut ctx = ctx();

        let err = pipeline.execute(&mut ctx).await.unwrap_err();

        assert!(matches!(err, PacerError::ParserNotFound(ref ct) if ct == "image/png"));
        assert!(ctx.parsed().is_none());
    }

    #[tokio::test]
    async fn missing_content_type_uses_octet_stream() {
        let fetcher = Arc::new(CannedFetcher::new(200, None, ""));
        let pipeline = FetchParsePipeline::new("fetch", fetcher, registry());

        let err = pipeline.execute(&mut ctx()).await.unwrap_err();

        assert!(
            matches!(err, PacerError::ParserNotFound(ref ct) if ct == UNKNOWN_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn error_status_becomes_fetch_error() {
        let fetcher = Arc::new(CannedFetcher::new(503, Some("text/plain"), "busy"));
        let pipeline = FetchParsePipeline::new("fetch", fetcher, registry());

        let err = pipeline.execute(&mut ctx()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, PacerError::Fetch { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let pipeline = FetchParsePipeline::new("fetch", Arc::new(DownFetcher), registry());
        let mut ctx = ctx();

        let err = pipeline.execute(&mut ctx).await.unwrap_err();

        assert!(matches!(err, PacerError::Fetch { status: None, .. }));
        assert!(ctx.fetched().is_none());
    }
}
