use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{ErrorRecovery, PipelineStage, StageError, StageResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const RENDER_STAGE: &str = "render";

/// Error reported by a `JavaScriptRenderer`
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Executes a page's scripts and returns the resulting document
///
/// No renderer ships with this crate; plug in a headless browser here.
#[async_trait]
pub trait JavaScriptRenderer: Send + Sync {
    async fn render(&self, url: &str, html: &str) -> Result<String, RenderError>;
}

/// Fills `rendered_content` through a `JavaScriptRenderer`
///
/// Enabled by `[javascript] enable-rendering` and bounded by
/// `timeout-seconds`. Failure falls back to the raw HTML with a warning.
pub struct RenderStage {
    renderer: Arc<dyn JavaScriptRenderer>,
}

impl RenderStage {
    pub fn new(renderer: Arc<dyn JavaScriptRenderer>) -> Self {
        Self { renderer }
    }
}

#[async_trait]
impl PipelineStage for RenderStage {
    fn name(&self) -> &str {
        RENDER_STAGE
    }

    fn is_enabled(&self, context: &ScrapingContext) -> bool {
        context.config().javascript.enable_rendering
    }

    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError> {
        let html = context.html_content.clone().unwrap_or_default();
        let timeout_seconds = context.config().javascript.timeout_seconds;
        let timeout = Duration::from_secs(timeout_seconds);

        let rendered = tokio::time::timeout(timeout, self.renderer.render(context.url(), &html))
            .await
            .map_err(|_| StageError::Render(format!("timed out after {}s", timeout_seconds)))?
            .map_err(|e| StageError::Render(e.to_string()))?;

        context.rendered_content = Some(rendered);
        Ok(StageResult::Continue)
    }

    fn on_error(&self, context: &mut ScrapingContext, error: StageError) -> ErrorRecovery {
        context.rendered_content = context.html_content.clone();
        context.add_warning(
            RENDER_STAGE,
            format!("{}; using unrendered HTML", error),
        );
        ErrorRecovery::Continue
    }

    fn dependencies(&self) -> &[&str] {
        &["fetch"]
    }
}
