use crate::extract::StrategyRegistry;
use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{PipelineStage, StageError, StageResult};
use async_trait::async_trait;
use std::sync::Arc;

pub const EXTRACT_STAGE: &str = "extract";

/// Names of the strategies a run should use, in configured order
///
/// `[schema] extraction-strategies` first, then the AI strategy when
/// `[ai-extraction]` is enabled. Duplicates are dropped.
pub fn configured_strategies(context: &ScrapingContext) -> Vec<String> {
    let config = context.config();
    let mut names: Vec<String> = Vec::new();

    let ai = config
        .ai_extraction
        .enabled
        .then(|| config.ai_extraction.strategy.clone());

    for name in config.schema.extraction_strategies.iter().cloned().chain(ai) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Runs every configured strategy over the page content
///
/// Each strategy that yields something contributes one entry to
/// `extraction_results`. A strategy failure or an unknown name is a warning.
pub struct ExtractStage {
    registry: Arc<StrategyRegistry>,
}

impl ExtractStage {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PipelineStage for ExtractStage {
    fn name(&self) -> &str {
        EXTRACT_STAGE
    }

    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError> {
        let content = context
            .effective_content()
            .ok_or_else(|| StageError::msg("No content to extract from"))?
            .to_string();

        for name in configured_strategies(context) {
            let Some(strategy) = self.registry.get(&name) else {
                context.add_warning(EXTRACT_STAGE, format!("Unknown extraction strategy '{}'", name));
                continue;
            };

            match strategy.extract_from_content(context.url(), &content).await {
                Ok(Some(result)) => {
                    context.extraction_results.insert(name, result);
                }
                Ok(None) => tracing::debug!("Strategy {} found nothing in {}", name, context.url()),
                Err(e) => context.add_warning(EXTRACT_STAGE, format!("{}: {}", name, e)),
            }
        }

        if context.extraction_results.is_empty() {
            context.add_warning(EXTRACT_STAGE, "No strategy produced a result");
        }
        Ok(StageResult::Continue)
    }

    fn dependencies(&self) -> &[&str] {
        &["fetch"]
    }
}
