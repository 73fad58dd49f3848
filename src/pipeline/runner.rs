//! Stage orchestration
//!
//! `ExtractionPipeline::run` drives one URL through the ordered stages. A
//! `Retry` outcome starts another attempt inside a bounded loop; there is no
//! recursion, and the task yields between attempts so that a caller's
//! deadline can take effect there.

use crate::config::{Config, RetryPolicy};
use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{PipelineStage, StageError, StageResult};
use crate::{HarvestError, Result};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

/// How one pass over the stages ended
enum Pass {
    Finished,
    /// Retry granted; holds the index of the stage that asked for it
    Retry(usize),
}

/// An ordered list of stages run against one `ScrapingContext` at a time
///
/// A pipeline is immutable while running and can be shared (`Arc`) by any
/// number of concurrent runs.
pub struct ExtractionPipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    index: HashMap<String, usize>,
    retry_policy: Option<RetryPolicy>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("stages", &self.stage_names())
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ExtractionPipeline {
    /// Creates an empty pipeline that takes its retry policy from each run's config
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            index: HashMap::new(),
            retry_policy: None,
        }
    }

    /// Fixes the retry policy, ignoring `[pipeline] retry-policy`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Adds a stage at the end, or before the stage currently at `position`
    ///
    /// # Errors
    ///
    /// * `HarvestError::DuplicateStage` - A stage with the same name exists
    /// * `HarvestError::StagePosition` - `position` is past the end
    pub fn add_stage(
        &mut self,
        stage: Box<dyn PipelineStage>,
        position: Option<usize>,
    ) -> Result<()> {
        let name = stage.name().to_string();
        if self.index.contains_key(&name) {
            return Err(HarvestError::DuplicateStage(name));
        }

        let len = self.stages.len();
        match position {
            Some(position) if position > len => {
                return Err(HarvestError::StagePosition { position, len });
            }
            Some(position) => self.stages.insert(position, stage),
            None => self.stages.push(stage),
        }

        self.rebuild_index();
        tracing::debug!("Added stage {} ({} stages)", name, self.stages.len());
        Ok(())
    }

    /// Builder form of `add_stage` for stages known to be unique
    pub(crate) fn push_stage(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.index.insert(stage.name().to_string(), self.stages.len());
        self.stages.push(stage);
        self
    }

    /// Removes a stage by name and hands it back
    pub fn remove_stage(&mut self, name: &str) -> Option<Box<dyn PipelineStage>> {
        let position = self.index.get(name).copied()?;
        let stage = self.stages.remove(position);
        self.rebuild_index();
        Some(stage)
    }

    pub fn get_stage(&self, name: &str) -> Option<&dyn PipelineStage> {
        self.index
            .get(name)
            .map(|&position| self.stages[position].as_ref())
    }

    /// Stage names in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .stages
            .iter()
            .enumerate()
            .map(|(position, stage)| (stage.name().to_string(), position))
            .collect();
    }

    /// Lists every declared dependency that names no stage in this pipeline
    ///
    /// Advisory only: `run` does not check dependencies.
    pub fn validate_dependencies(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for stage in &self.stages {
            for dependency in stage.dependencies() {
                if !self.index.contains_key(*dependency) {
                    problems.push(format!(
                        "Stage '{}' depends on missing stage '{}'",
                        stage.name(),
                        dependency
                    ));
                }
            }
        }
        problems
    }

    /// Runs every stage against a new context for `url`
    ///
    /// Never fails: stage errors, panics and exhausted retries all end up in
    /// the returned context's error log.
    pub async fn run(&self, url: &str, config: Arc<Config>) -> ScrapingContext {
        let started = Instant::now();
        let policy = self
            .retry_policy
            .unwrap_or(config.pipeline.retry_policy);
        let mut context = ScrapingContext::new(url, config);

        tracing::debug!("Starting pipeline for {}", url);

        let mut first_stage = 0;
        loop {
            match self.run_pass(&mut context, first_stage).await {
                Pass::Finished => break,
                Pass::Retry(failed_stage) => {
                    let full_restart = policy == RetryPolicy::FullRestart;
                    context.begin_retry(full_restart);
                    first_stage = if full_restart { 0 } else { failed_stage };

                    tracing::info!(
                        "Retrying {} (attempt {} of {}) from stage {}",
                        url,
                        context.retry_count() + 1,
                        context.max_retries() + 1,
                        self.stages[first_stage].name()
                    );
                    tokio::task::yield_now().await;
                }
            }
        }

        context.processing_time = started.elapsed();
        tracing::debug!(
            "Pipeline for {} finished in {:?} ({} errors, {} warnings)",
            url,
            context.processing_time,
            context.errors().len(),
            context.warnings().len()
        );
        context
    }

    async fn run_pass(&self, context: &mut ScrapingContext, first_stage: usize) -> Pass {
        for (position, stage) in self.stages.iter().enumerate().skip(first_stage) {
            let name = stage.name();

            if !stage.is_enabled(context) {
                tracing::trace!("Skipping disabled stage {}", name);
                continue;
            }
            if context.should_stop() {
                break;
            }

            let stage_started = Instant::now();
            let result = match AssertUnwindSafe(stage.process(context)).catch_unwind().await {
                Ok(Ok(result)) => result,
                Ok(Err(error)) => stage.on_error(context, error).into(),
                Err(panic) => {
                    let error = StageError::Panic(panic_message(panic.as_ref()));
                    stage.on_error(context, error).into()
                }
            };
            context
                .stage_times
                .insert(name.to_string(), stage_started.elapsed());

            let pass = match result {
                StageResult::Continue => None,
                StageResult::StopSuccess => {
                    context.stop_with_success();
                    Some(Pass::Finished)
                }
                StageResult::StopFailure => {
                    context.stop_with_failure(name, format!("Stage {} failed", name));
                    Some(Pass::Finished)
                }
                StageResult::Retry => {
                    if context.request_retry(name) {
                        Some(Pass::Retry(position))
                    } else {
                        Some(Pass::Finished)
                    }
                }
            };

            match AssertUnwindSafe(stage.cleanup(context)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::debug!("Cleanup of stage {} failed: {}", name, error),
                Err(_) => tracing::debug!("Cleanup of stage {} panicked", name),
            }

            if let Some(pass) = pass {
                return pass;
            }
        }
        Pass::Finished
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
