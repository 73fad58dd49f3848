//! Harvest coordinator - runs many pages through one pipeline
//!
//! Every URL gets its own `ScrapingContext`; pages run concurrently up to
//! `max-concurrent-pages`, each under the `timeout-per-page` deadline. Pacing
//! state is shared through the pipeline's collaborators, so two pages on the
//! same site still respect that site's spacing.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, HttpFetcher};
use crate::extract::{ShallowMerger, StrategyRegistry};
use crate::pipeline::{ExtractionPipeline, ScrapingContext, StandardStages};
use crate::ratelimit::Politeness;
use crate::robots::{HttpRobotsChecker, RobotsCache};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// Stage name used for failures raised by the coordinator itself
pub const HARVESTER_STAGE: &str = "harvester";

/// Runs URLs through an `ExtractionPipeline` with bounded concurrency
pub struct Harvester {
    pipeline: Arc<ExtractionPipeline>,
    config: Arc<Config>,
    politeness: Option<Arc<Politeness>>,
}

impl Harvester {
    /// Creates a harvester around an existing pipeline
    pub fn new(pipeline: Arc<ExtractionPipeline>, config: Arc<Config>) -> Self {
        Self {
            pipeline,
            config,
            politeness: None,
        }
    }

    /// Builds the standard HTTP pipeline for a validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to run
    /// * `Err(HarvestError)` - Invalid pacing settings or HTTP client failure
    pub fn from_config(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let request_timeout = config
            .crawler
            .page_timeout()
            .unwrap_or(Duration::from_secs(60));
        let client = build_http_client(&config.user_agent, request_timeout)?;

        let politeness = Arc::new(Politeness::from_config(&config)?);
        let robots = HttpRobotsChecker::new(
            client.clone(),
            config.user_agent.crawler_name.clone(),
            Arc::new(RobotsCache::new()),
            politeness.clone(),
        );
        let fetcher = HttpFetcher::from_config(&config, client, politeness.clone());

        let pipeline = ExtractionPipeline::standard(StandardStages {
            robots: Arc::new(robots),
            fetcher: Arc::new(fetcher),
            renderer: None,
            registry: Arc::new(StrategyRegistry::with_defaults()),
            merger: Arc::new(ShallowMerger),
        });

        for problem in pipeline.validate_dependencies() {
            tracing::warn!("{}", problem);
        }
        if config.javascript.enable_rendering {
            tracing::warn!("JavaScript rendering is enabled but no renderer is available");
        }

        Ok(Self {
            pipeline: Arc::new(pipeline),
            config,
            politeness: Some(politeness),
        })
    }

    pub fn pipeline(&self) -> &Arc<ExtractionPipeline> {
        &self.pipeline
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Pacing controllers, when built by `from_config`
    pub fn politeness(&self) -> Option<&Arc<Politeness>> {
        self.politeness.as_ref()
    }

    /// Runs one URL under the per-page deadline
    pub async fn harvest_one(&self, url: &str) -> ScrapingContext {
        run_page(self.pipeline.clone(), self.config.clone(), url.to_string()).await
    }

    /// Runs every URL, at most `max-concurrent-pages` at a time
    ///
    /// # Returns
    ///
    /// One context per URL, in input order. A page whose task dies comes
    /// back as a failed context tagged `harvester`.
    pub async fn harvest(&self, urls: &[String]) -> Vec<ScrapingContext> {
        let limit = self.config.crawler.max_concurrent_pages.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(limit));

        tracing::info!(
            "Harvesting {} URLs ({} at a time)",
            urls.len(),
            limit
        );

        let handles: Vec<_> = urls
            .iter()
            .map(|url| {
                let semaphore = semaphore.clone();
                let pipeline = self.pipeline.clone();
                let config = self.config.clone();
                let url = url.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    run_page(pipeline, config, url).await
                })
            })
            .collect();

        let mut contexts = Vec::with_capacity(handles.len());
        for (url, handle) in urls.iter().zip(handles) {
            let context = match handle.await {
                Ok(context) => context,
                Err(error) => task_failure(url, self.config.clone(), error),
            };
            tracing::info!(
                "[{}/{}] {} {} in {:?}",
                contexts.len() + 1,
                urls.len(),
                if context.is_success() { "done" } else { "failed" },
                context.url(),
                context.processing_time
            );
            contexts.push(context);
        }
        contexts
    }
}

fn task_failure(url: &str, config: Arc<Config>, error: JoinError) -> ScrapingContext {
    tracing::error!("Page task for {} failed: {}", url, error);
    let mut context = ScrapingContext::new(url, config);
    context.stop_with_failure(HARVESTER_STAGE, format!("Page task failed: {}", error));
    context
}

async fn run_page(
    pipeline: Arc<ExtractionPipeline>,
    config: Arc<Config>,
    url: String,
) -> ScrapingContext {
    let Some(limit) = config.crawler.page_timeout() else {
        return pipeline.run(&url, config).await;
    };

    match tokio::time::timeout(limit, pipeline.run(&url, config.clone())).await {
        Ok(context) => context,
        Err(_) => {
            let mut context = ScrapingContext::new(url, config);
            context.stop_with_failure(
                HARVESTER_STAGE,
                format!("Page timed out after {}s", limit.as_secs_f64()),
            );
            context.processing_time = limit;
            context
        }
    }
}
