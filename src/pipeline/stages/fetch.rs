use crate::crawler::HtmlFetcher;
use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{PipelineStage, StageError, StageResult};
use async_trait::async_trait;
use std::sync::Arc;

pub const FETCH_STAGE: &str = "fetch";

/// Downloads the page body into `html_content`
///
/// Pacing is the fetcher's job. A transient failure requests a pipeline
/// retry; anything else fails the run.
pub struct FetchStage {
    fetcher: Arc<dyn HtmlFetcher>,
}

impl FetchStage {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl PipelineStage for FetchStage {
    fn name(&self) -> &str {
        FETCH_STAGE
    }

    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError> {
        match self.fetcher.fetch(context.url()).await {
            Ok(body) => {
                tracing::debug!("Fetched {} ({} bytes)", context.url(), body.len());
                context.html_content = Some(body);
                Ok(StageResult::Continue)
            }
            Err(e) if e.is_retryable() => {
                context.add_warning(FETCH_STAGE, e.to_string());
                Ok(StageResult::Retry)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn dependencies(&self) -> &[&str] {
        &["robots_check"]
    }
}
