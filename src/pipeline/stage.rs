//! The stage interface and its outcome types

use crate::crawler::FetchError;
use crate::extract::ExtractError;
use crate::pipeline::context::ScrapingContext;
use crate::robots::RobotsError;
use crate::UrlError;
use async_trait::async_trait;
use thiserror::Error;

/// What the pipeline should do after a stage returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageResult {
    /// Run the next stage
    Continue,
    /// End the run successfully
    StopSuccess,
    /// End the run as failed
    StopFailure,
    /// Start another attempt (bounded by `max_retries`)
    Retry,
}

/// What the pipeline should do after a stage raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRecovery {
    Continue,
    StopFailure,
    Retry,
}

impl From<ErrorRecovery> for StageResult {
    fn from(recovery: ErrorRecovery) -> Self {
        match recovery {
            ErrorRecovery::Continue => StageResult::Continue,
            ErrorRecovery::StopFailure => StageResult::StopFailure,
            ErrorRecovery::Retry => StageResult::Retry,
        }
    }
}

/// Errors raised by a stage's `process` or `cleanup`
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Message(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] UrlError),

    #[error("Robots check failed: {0}")]
    Robots(#[from] RobotsError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("Stage panicked: {0}")]
    Panic(String),
}

impl StageError {
    pub fn msg(message: impl Into<String>) -> Self {
        StageError::Message(message.into())
    }
}

/// A named unit of work in an `ExtractionPipeline`
///
/// Stages are shared by every concurrent run of a pipeline, so any state they
/// hold must be their own configuration or collaborators; everything that
/// belongs to one page lives in the `ScrapingContext`.
///
/// `process` may be invoked again on a later attempt of the same run (see
/// `RetryPolicy`) and must tolerate that.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Unique name within a pipeline; also the key in `stage_times`
    fn name(&self) -> &str;

    /// Performs the stage's work
    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError>;

    /// Stages that report `false` are skipped for this context
    fn is_enabled(&self, _context: &ScrapingContext) -> bool {
        true
    }

    /// Decides how to proceed after `process` failed
    ///
    /// The default records the error against this stage and stops the run.
    fn on_error(&self, context: &mut ScrapingContext, error: StageError) -> ErrorRecovery {
        context.add_error(self.name(), error.to_string());
        ErrorRecovery::StopFailure
    }

    /// Names of stages expected to run before this one
    ///
    /// Only checked by `ExtractionPipeline::validate_dependencies`.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Runs after every invocation, whatever its outcome; errors are ignored
    async fn cleanup(&self, _context: &mut ScrapingContext) -> Result<(), StageError> {
        Ok(())
    }
}
