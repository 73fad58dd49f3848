//! Integration tests for Sumi-Harvest
//!
//! These tests use wiremock to create mock HTTP servers and run pages
//! through the standard pipeline end-to-end. They run on real time: the
//! HTTP client's own timeouts would fire under a paused clock.

mod harvest_tests;
mod politeness_tests;

use sumi_harvest::config::Config;

/// Configuration with short delays, suitable for a local mock server
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.user_agent.crawler_name = "TestBot".to_string();
    config.crawler.timeout_per_page = 10.0;
    config.rate_limit.default_delay = 0.05;
    config.backoff.base_delay = 0.05;
    config.backoff.max_delay = 0.2;
    config
}

/// A product page carrying both JSON-LD and plain metadata
pub fn product_page(name: &str) -> String {
    format!(
        r#"<html><head>
        <title>{name} page</title>
        <meta name="description" content="All about {name}">
        <script type="application/ld+json">{{"@type": "Product", "name": "{name}"}}</script>
        </head><body><h1>{name}</h1></body></html>"#
    )
}
