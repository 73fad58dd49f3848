//! Stage-based extraction pipeline
//!
//! This module provides:
//! - `ScrapingContext`: everything known about one page while it is processed
//! - `PipelineStage`: the interface every unit of work implements
//! - `ExtractionPipeline`: runs stages in order with continue/stop/retry semantics
//! - The standard stages and the collaborators they call
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sumi_harvest::config::Config;
//! use sumi_harvest::pipeline::ExtractionPipeline;
//!
//! # async fn demo(pipeline: ExtractionPipeline) {
//! let context = pipeline.run("https://example.com/", Arc::new(Config::default())).await;
//! if context.is_success() {
//!     println!("{}", context.final_result.unwrap());
//! }
//! # }
//! ```

mod context;
mod runner;
mod stage;
pub mod stages;

pub use context::{ScrapingContext, StageMessage, MAX_RETRIES_EXCEEDED};
pub use runner::ExtractionPipeline;
pub use stage::{ErrorRecovery, PipelineStage, StageError, StageResult};
pub use stages::{JavaScriptRenderer, RenderError};

use crate::crawler::HtmlFetcher;
use crate::extract::{ResultMerger, StrategyRegistry};
use crate::robots::RobotsChecker;
use std::sync::Arc;

/// Collaborators for `ExtractionPipeline::standard`
pub struct StandardStages {
    pub robots: Arc<dyn RobotsChecker>,
    pub fetcher: Arc<dyn HtmlFetcher>,

    /// The render stage is only added when a renderer is supplied
    pub renderer: Option<Arc<dyn JavaScriptRenderer>>,

    pub registry: Arc<StrategyRegistry>,
    pub merger: Arc<dyn ResultMerger>,
}

impl ExtractionPipeline {
    /// Builds `robots_check → fetch → [render] → extract → merge`
    pub fn standard(parts: StandardStages) -> Self {
        let mut pipeline = ExtractionPipeline::new()
            .push_stage(Box::new(stages::RobotsCheckStage::new(parts.robots)))
            .push_stage(Box::new(stages::FetchStage::new(parts.fetcher)));

        if let Some(renderer) = parts.renderer {
            pipeline = pipeline.push_stage(Box::new(stages::RenderStage::new(renderer)));
        }

        pipeline
            .push_stage(Box::new(stages::ExtractStage::new(parts.registry)))
            .push_stage(Box::new(stages::MergeStage::new(parts.merger)))
    }
}
