use crate::extract::ResultMerger;
use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{PipelineStage, StageError, StageResult};
use crate::pipeline::stages::extract::configured_strategies;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const MERGE_STAGE: &str = "merge";

/// Combines the per-strategy results into `final_result` and ends the run
pub struct MergeStage {
    merger: Arc<dyn ResultMerger>,
}

impl MergeStage {
    pub fn new(merger: Arc<dyn ResultMerger>) -> Self {
        Self { merger }
    }
}

#[async_trait]
impl PipelineStage for MergeStage {
    fn name(&self) -> &str {
        MERGE_STAGE
    }

    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError> {
        if context.extraction_results.is_empty() {
            context.add_warning(MERGE_STAGE, "Nothing to merge");
            return Ok(StageResult::StopFailure);
        }

        // Configured order decides precedence; anything else follows by name
        let mut order = configured_strategies(context);
        let mut extra: Vec<&String> = context
            .extraction_results
            .keys()
            .filter(|name| !order.contains(name))
            .collect();
        extra.sort();
        order.extend(extra.into_iter().cloned());

        let results: Vec<(&str, &Value)> = order
            .iter()
            .filter_map(|name| {
                context
                    .extraction_results
                    .get(name)
                    .map(|value| (name.as_str(), value))
            })
            .collect();

        let merged = self.merger.merge(&results);
        context.final_result = Some(merged);
        Ok(StageResult::StopSuccess)
    }

    fn dependencies(&self) -> &[&str] {
        &["extract"]
    }
}
