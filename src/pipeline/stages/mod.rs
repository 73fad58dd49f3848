//! The stages of the standard extraction pipeline
//!
//! In order: `robots_check`, `fetch`, `render` (only when a renderer is
//! supplied), `extract`, `merge`.

mod extract;
mod fetch;
mod merge;
mod render;
mod robots;

pub use extract::{configured_strategies, ExtractStage, EXTRACT_STAGE};
pub use fetch::{FetchStage, FETCH_STAGE};
pub use merge::{MergeStage, MERGE_STAGE};
pub use render::{JavaScriptRenderer, RenderError, RenderStage, RENDER_STAGE};
pub use robots::{RobotsCheckStage, ROBOTS_STAGE};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawler::{FetchError, HtmlFetcher};
    use crate::extract::{ShallowMerger, StrategyRegistry};
    use crate::pipeline::{ExtractionPipeline, StandardStages};
    use crate::robots::{RobotsChecker, RobotsError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const PAGE: &str = r#"<html><head><title>Widgets</title>
        <meta name="description" content="All about widgets">
        <script type="application/ld+json">{"@type": "Product", "name": "Widget"}</script>
        </head><body><h1>Widgets</h1><a href="/more">More</a></body></html>"#;

    enum RobotsAnswer {
        Allow,
        Deny,
        Unreachable,
    }

    struct FakeRobots(RobotsAnswer);

    #[async_trait]
    impl RobotsChecker for FakeRobots {
        async fn can_fetch(&self, _url: &str) -> Result<bool, RobotsError> {
            match self.0 {
                RobotsAnswer::Allow => Ok(true),
                RobotsAnswer::Deny => Ok(false),
                RobotsAnswer::Unreachable => Err(RobotsError::Status(503)),
            }
        }
    }

    /// Fails with a retryable error `failures` times, then serves `PAGE`
    struct FakeFetcher {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HtmlFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(FetchError::Status(503))
            } else {
                Ok(PAGE.to_string())
            }
        }
    }

    struct SlowRenderer;

    #[async_trait]
    impl JavaScriptRenderer for SlowRenderer {
        async fn render(&self, _url: &str, html: &str) -> Result<String, RenderError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(html.to_string())
        }
    }

    struct UppercaseRenderer;

    #[async_trait]
    impl JavaScriptRenderer for UppercaseRenderer {
        async fn render(&self, _url: &str, html: &str) -> Result<String, RenderError> {
            Ok(html.replace("Widgets</title>", "Rendered Widgets</title>"))
        }
    }

    fn standard(
        robots: RobotsAnswer,
        fetcher: Arc<FakeFetcher>,
        renderer: Option<Arc<dyn JavaScriptRenderer>>,
    ) -> ExtractionPipeline {
        ExtractionPipeline::standard(StandardStages {
            robots: Arc::new(FakeRobots(robots)),
            fetcher,
            renderer,
            registry: Arc::new(StrategyRegistry::with_defaults()),
            merger: Arc::new(ShallowMerger),
        })
    }

    #[tokio::test]
    async fn test_standard_pipeline_success() {
        let pipeline = standard(RobotsAnswer::Allow, Arc::new(FakeFetcher::new(0)), None);
        assert!(pipeline.validate_dependencies().is_empty());

        let context = pipeline
            .run("https://shop.test/widgets", Arc::new(Config::default()))
            .await;

        assert!(context.is_success());
        assert!(!context.has_errors());
        assert!(context.extraction_results.contains_key("metadata"));
        assert!(context.extraction_results.contains_key("json_ld"));

        let result = context.final_result.unwrap();
        assert_eq!(result["title"], "Widgets");
        assert_eq!(result["@type"], "Product");
        for stage in ["robots_check", "fetch", "extract", "merge"] {
            assert!(context.stage_times.contains_key(stage), "{} not timed", stage);
        }
    }

    #[tokio::test]
    async fn test_robots_disallow_stops_before_fetch() {
        let fetcher = Arc::new(FakeFetcher::new(0));
        let pipeline = standard(RobotsAnswer::Deny, fetcher.clone(), None);

        let context = pipeline
            .run("https://shop.test/private", Arc::new(Config::default()))
            .await;

        assert!(!context.robots_allowed);
        assert!(context.is_failed());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(context.errors().iter().all(|e| e.stage == ROBOTS_STAGE));
    }

    #[tokio::test]
    async fn test_robots_failure_fails_open() {
        let pipeline = standard(RobotsAnswer::Unreachable, Arc::new(FakeFetcher::new(0)), None);

        let context = pipeline
            .run("https://shop.test/", Arc::new(Config::default()))
            .await;

        assert!(context.is_success());
        assert!(context.robots_allowed);
        assert_eq!(context.warnings()[0].stage, ROBOTS_STAGE);
    }

    #[tokio::test]
    async fn test_robots_stage_disabled_by_config() {
        let pipeline = standard(RobotsAnswer::Deny, Arc::new(FakeFetcher::new(0)), None);
        let mut config = Config::default();
        config.crawler.respect_robots_txt = false;

        let context = pipeline.run("https://shop.test/", Arc::new(config)).await;

        assert!(context.is_success());
        assert!(!context.stage_times.contains_key(ROBOTS_STAGE));
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_is_retried() {
        let fetcher = Arc::new(FakeFetcher::new(2));
        let pipeline = standard(RobotsAnswer::Allow, fetcher.clone(), None);

        let context = pipeline
            .run("https://shop.test/", Arc::new(Config::default()))
            .await;

        assert!(context.is_success());
        assert_eq!(context.retry_count(), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(context.warnings().len(), 2);
    }

    #[tokio::test]
    async fn test_render_timeout_degrades_to_raw_html() {
        tokio::time::pause();

        let pipeline = standard(
            RobotsAnswer::Allow,
            Arc::new(FakeFetcher::new(0)),
            Some(Arc::new(SlowRenderer)),
        );
        let mut config = Config::default();
        config.javascript.enable_rendering = true;
        config.javascript.timeout_seconds = 5;

        let context = pipeline.run("https://shop.test/", Arc::new(config)).await;

        assert!(context.is_success());
        assert_eq!(context.rendered_content, context.html_content);
        assert!(context.warnings()[0].message.contains("timed out after 5s"));
    }

    #[tokio::test]
    async fn test_rendered_content_feeds_extraction() {
        let pipeline = standard(
            RobotsAnswer::Allow,
            Arc::new(FakeFetcher::new(0)),
            Some(Arc::new(UppercaseRenderer)),
        );
        let mut config = Config::default();
        config.javascript.enable_rendering = true;

        let context = pipeline.run("https://shop.test/", Arc::new(config)).await;

        assert_eq!(context.final_result.unwrap()["title"], "Rendered Widgets");
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_a_warning() {
        let pipeline = standard(RobotsAnswer::Allow, Arc::new(FakeFetcher::new(0)), None);
        let mut config = Config::default();
        config.schema.extraction_strategies = vec!["metadata".to_string(), "magic".to_string()];

        let context = pipeline.run("https://shop.test/", Arc::new(config)).await;

        assert!(context.is_success());
        assert!(context
            .warnings()
            .iter()
            .any(|w| w.message.contains("'magic'")));
    }

    #[tokio::test]
    async fn test_nothing_extracted_fails_at_merge() {
        let pipeline = standard(RobotsAnswer::Allow, Arc::new(FakeFetcher::new(0)), None);
        let mut config = Config::default();
        config.schema.extraction_strategies = Vec::new();

        let context = pipeline.run("https://shop.test/", Arc::new(config)).await;

        assert!(context.is_failed());
        assert_eq!(context.errors()[0].message, "Stage merge failed");
        assert!(context.final_result.is_none());
    }
}
