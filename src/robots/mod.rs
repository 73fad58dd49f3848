//! Robots.txt handling module
//!
//! This module provides the `RobotsChecker` interface used by the
//! `robots_check` stage and an HTTP implementation that fetches, parses and
//! caches robots.txt per origin. Any `Crawl-delay` found raises the site's
//! spacing in the shared `DomainRateLimiter`.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, DEFAULT_MAX_AGE_HOURS};
pub use parser::ParsedRobots;

use crate::ratelimit::{Politeness, RetryAfterController};
use crate::url::{domain_of, parse_http_url};
use crate::UrlError;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// How long a failed robots.txt fetch is remembered before trying again
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(60);

/// Reasons robots.txt could not be checked
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("invalid URL: {0}")]
    Url(#[from] UrlError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("robots.txt answered with HTTP {0}")]
    Status(u16),

    #[error("robots.txt failed recently ({0}); not retrying yet")]
    RecentFailure(String),
}

/// Decides whether a URL may be crawled
#[async_trait]
pub trait RobotsChecker: Send + Sync {
    /// # Returns
    ///
    /// * `Ok(true)` / `Ok(false)` - The rules allow / disallow the URL
    /// * `Err(RobotsError)` - The rules could not be determined
    async fn can_fetch(&self, url: &str) -> Result<bool, RobotsError>;
}

#[derive(Debug)]
struct FailedFetch {
    at: Instant,
    reason: String,
}

/// Fetches robots.txt over HTTP with the crawler's client
///
/// Answers per RFC 9309: a 4xx means there are no rules; a 5xx or a network
/// failure is an error (the pipeline then fails open). Failures are
/// remembered per origin for a short while so a struggling site is not asked
/// again for every page.
pub struct HttpRobotsChecker {
    client: Client,
    user_agent: String,
    cache: Arc<RobotsCache>,
    politeness: Arc<Politeness>,
    failures: DashMap<String, FailedFetch>,
    failure_ttl: Duration,
}

impl HttpRobotsChecker {
    /// Creates a checker
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client (see `crawler::build_http_client`)
    /// * `user_agent` - Product token matched against `User-agent` lines
    /// * `cache` - Cache shared by every checker of the crawl
    /// * `politeness` - Pacing shared with the page fetcher
    pub fn new(
        client: Client,
        user_agent: impl Into<String>,
        cache: Arc<RobotsCache>,
        politeness: Arc<Politeness>,
    ) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            cache,
            politeness,
            failures: DashMap::new(),
            failure_ttl: DEFAULT_FAILURE_TTL,
        }
    }

    /// Changes how long a failed fetch is remembered
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<RobotsCache> {
        &self.cache
    }

    /// Returns the rules for the URL's origin, fetching them if needed
    pub async fn robots_for(&self, url: &Url) -> Result<Arc<ParsedRobots>, RobotsError> {
        let origin = url.origin().ascii_serialization();
        if let Some(robots) = self.cache.get(&origin) {
            return Ok(robots);
        }
        if let Some(reason) = self.recent_failure(&origin) {
            return Err(RobotsError::RecentFailure(reason));
        }

        let domain = domain_of(url).ok_or(UrlError::MissingDomain)?;
        let robots_url = url
            .join("/robots.txt")
            .map_err(|e| UrlError::Parse(e.to_string()))?;

        match self.fetch(&domain, &robots_url).await {
            Ok(robots) => {
                self.failures.remove(&origin);
                self.apply_crawl_delay(&domain, &robots);
                Ok(self.cache.insert(&origin, robots))
            }
            Err(e) => {
                self.failures.insert(
                    origin,
                    FailedFetch {
                        at: Instant::now(),
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn fetch(&self, domain: &str, robots_url: &Url) -> Result<ParsedRobots, RobotsError> {
        self.politeness.before_request(robots_url.as_str()).await?;
        tracing::debug!("Fetching {}", robots_url);

        let response = self.client.get(robots_url.as_str()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(ParsedRobots::from_content(&response.text().await?))
        } else if status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::SERVICE_UNAVAILABLE
        {
            let directive = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(RetryAfterController::parse_directive);
            if let Some(requested) = directive {
                self.politeness
                    .retry_after()
                    .record_directive(domain, requested);
            }
            Err(RobotsError::Status(status.as_u16()))
        } else if status.is_client_error() {
            tracing::debug!("{} answered {}; no restrictions", robots_url, status);
            Ok(ParsedRobots::allow_all())
        } else {
            Err(RobotsError::Status(status.as_u16()))
        }
    }

    fn recent_failure(&self, origin: &str) -> Option<String> {
        let failure = self.failures.get(origin)?;
        if failure.at.elapsed() < self.failure_ttl {
            Some(failure.reason.clone())
        } else {
            drop(failure);
            self.failures.remove(origin);
            None
        }
    }

    /// Raises the domain's spacing to the site's Crawl-delay (never lowers it)
    fn apply_crawl_delay(&self, domain: &str, robots: &ParsedRobots) {
        let Some(requested) = robots.crawl_delay(&self.user_agent) else {
            return;
        };

        let limiter = self.politeness.rate_limiter();
        let delay = requested.min(limiter.max_delay());
        if delay <= limiter.delay_for(domain) {
            return;
        }

        match limiter.configure_domain_delay(domain, delay.as_secs_f64()) {
            Ok(()) => tracing::info!("Honoring Crawl-delay of {:?} for {}", delay, domain),
            Err(e) => tracing::warn!("Ignoring Crawl-delay for {}: {}", domain, e),
        }
    }
}

#[async_trait]
impl RobotsChecker for HttpRobotsChecker {
    async fn can_fetch(&self, url: &str) -> Result<bool, RobotsError> {
        let parsed = parse_http_url(url)?;
        let robots = self.robots_for(&parsed).await?;
        let allowed = robots.is_allowed(url, &self.user_agent);
        if !allowed {
            tracing::info!("robots.txt disallows {}", url);
        }
        Ok(allowed)
    }
}
