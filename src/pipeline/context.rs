//! The mutable record threaded through one pipeline run

use crate::config::Config;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error text recorded when a retry is requested with no retries left
pub const MAX_RETRIES_EXCEEDED: &str = "Maximum retries exceeded";

/// An error or warning, tagged with the stage that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageMessage {
    pub stage: String,
    pub message: String,
}

impl fmt::Display for StageMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// State of one extraction job
///
/// A context is owned by the run that created it and is never shared between
/// concurrent runs. Stages read and write the public content fields directly;
/// the control flags are only reachable through methods so that a stop, once
/// requested, cannot be undone by a later stage.
#[derive(Debug, Clone)]
pub struct ScrapingContext {
    url: String,
    config: Arc<Config>,

    /// Raw page body, once fetched
    pub html_content: Option<String>,

    /// JavaScript-rendered body, if a render stage produced one
    pub rendered_content: Option<String>,

    /// Whether robots.txt allows the URL
    pub robots_allowed: bool,

    /// One result per strategy that produced something, keyed by strategy name
    pub extraction_results: HashMap<String, Value>,

    /// Merged result; `None` until a terminal stage sets it
    pub final_result: Option<Value>,

    should_stop: bool,
    should_retry: bool,
    failed: bool,
    retry_count: u32,
    max_retries: u32,

    errors: Vec<StageMessage>,
    warnings: Vec<StageMessage>,

    /// Total wall-clock time of the run, across retries
    pub processing_time: Duration,

    /// Elapsed time of each stage's last invocation
    pub stage_times: HashMap<String, Duration>,
}

impl ScrapingContext {
    /// Creates a fresh context; `max_retries` comes from `[pipeline]`
    pub fn new(url: impl Into<String>, config: Arc<Config>) -> Self {
        let max_retries = config.pipeline.max_retries;
        Self {
            url: url.into(),
            config,
            html_content: None,
            rendered_content: None,
            robots_allowed: true,
            extraction_results: HashMap::new(),
            final_result: None,
            should_stop: false,
            should_retry: false,
            failed: false,
            retry_count: 0,
            max_retries,
            errors: Vec::new(),
            warnings: Vec::new(),
            processing_time: Duration::ZERO,
            stage_times: HashMap::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Content extraction should read: rendered if available, else raw
    pub fn effective_content(&self) -> Option<&str> {
        self.rendered_content
            .as_deref()
            .or(self.html_content.as_deref())
    }

    /// Records an error against `stage`
    pub fn add_error(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("[{}] {}: {}", stage, self.url, message);
        self.errors.push(StageMessage {
            stage: stage.to_string(),
            message,
        });
    }

    /// Records a warning against `stage`
    pub fn add_warning(&mut self, stage: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("[{}] {}: {}", stage, self.url, message);
        self.warnings.push(StageMessage {
            stage: stage.to_string(),
            message,
        });
    }

    pub fn errors(&self) -> &[StageMessage] {
        &self.errors
    }

    pub fn warnings(&self) -> &[StageMessage] {
        &self.warnings
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns `true` while another full retry is still allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Asks the pipeline to retry
    ///
    /// With no retries left this becomes a terminal failure tagged with
    /// `stage`, recorded as "Maximum retries exceeded".
    ///
    /// # Returns
    ///
    /// `true` if the retry was granted.
    pub fn request_retry(&mut self, stage: &str) -> bool {
        if self.can_retry() {
            self.should_retry = true;
            true
        } else {
            self.stop_with_failure(stage, MAX_RETRIES_EXCEEDED);
            false
        }
    }

    pub fn should_retry(&self) -> bool {
        self.should_retry
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop
    }

    /// Ends the run successfully; later stages do not run
    pub fn stop_with_success(&mut self) {
        self.should_stop = true;
    }

    /// Ends the run with an error attributed to `stage`
    pub fn stop_with_failure(&mut self, stage: &str, message: impl Into<String>) {
        self.add_error(stage, message);
        self.should_stop = true;
        self.failed = true;
    }

    /// Whether the run ended through `stop_with_failure`
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// A run succeeded when it produced a merged result and did not fail
    pub fn is_success(&self) -> bool {
        !self.failed && self.final_result.is_some()
    }

    /// Prepares the context for the next attempt
    ///
    /// With `clear_content` every URL-derived field and control flag is reset,
    /// as if the context were new; the retry counter, the error and warning
    /// logs and the stage timings carry over. Without it only the retry flag
    /// is cleared.
    pub(crate) fn begin_retry(&mut self, clear_content: bool) {
        self.retry_count += 1;
        self.should_retry = false;

        if clear_content {
            self.html_content = None;
            self.rendered_content = None;
            self.robots_allowed = true;
            self.extraction_results.clear();
            self.final_result = None;
            self.should_stop = false;
            self.failed = false;
        }
    }
}
