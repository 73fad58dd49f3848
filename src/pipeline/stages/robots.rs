use crate::pipeline::context::ScrapingContext;
use crate::pipeline::stage::{ErrorRecovery, PipelineStage, StageError, StageResult};
use crate::robots::RobotsChecker;
use async_trait::async_trait;
use std::sync::Arc;

pub const ROBOTS_STAGE: &str = "robots_check";

/// Stops the run when robots.txt disallows the URL
///
/// Enabled by `[crawler] respect-robots-txt`. When the rules cannot be
/// obtained the URL is treated as allowed and a warning is recorded.
pub struct RobotsCheckStage {
    checker: Arc<dyn RobotsChecker>,
}

impl RobotsCheckStage {
    pub fn new(checker: Arc<dyn RobotsChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl PipelineStage for RobotsCheckStage {
    fn name(&self) -> &str {
        ROBOTS_STAGE
    }

    fn is_enabled(&self, context: &ScrapingContext) -> bool {
        context.config().crawler.respect_robots_txt
    }

    async fn process(&self, context: &mut ScrapingContext) -> Result<StageResult, StageError> {
        let allowed = self.checker.can_fetch(context.url()).await?;
        context.robots_allowed = allowed;

        if allowed {
            Ok(StageResult::Continue)
        } else {
            context.add_error(ROBOTS_STAGE, "URL is disallowed by robots.txt");
            Ok(StageResult::StopFailure)
        }
    }

    fn on_error(&self, context: &mut ScrapingContext, error: StageError) -> ErrorRecovery {
        context.robots_allowed = true;
        context.add_warning(
            ROBOTS_STAGE,
            format!("Could not check robots.txt, assuming allowed: {}", error),
        );
        ErrorRecovery::Continue
    }
}
