//! One handle for everything a fetcher must do to stay polite

use crate::config::Config;
use crate::ratelimit::backoff::BackoffController;
use crate::ratelimit::domain::DomainRateLimiter;
use crate::ratelimit::retry_after::{Pacing, RetryAfterController};
use crate::url::extract_domain;
use crate::{ConfigResult, UrlResult};
use std::sync::Arc;
use std::time::Duration;

/// Spacing, backoff and Retry-After bundled for a fetcher
///
/// A single `Politeness` is meant to be shared (behind an `Arc`) by every
/// worker of a crawl so that per-domain state is global to the crawl.
#[derive(Debug)]
pub struct Politeness {
    limiter: Arc<DomainRateLimiter>,
    backoff: BackoffController,
    retry_after: RetryAfterController,
}

impl Politeness {
    /// Builds all three controllers from a validated configuration
    pub fn from_config(config: &Config) -> ConfigResult<Self> {
        let limiter = Arc::new(DomainRateLimiter::from_config(&config.rate_limit)?);
        let backoff = BackoffController::from_config(&config.backoff)?;
        let retry_after = RetryAfterController::from_config(&config.retry_after, limiter.clone())?;
        Ok(Self::from_parts(backoff, retry_after))
    }

    /// Combines existing controllers; spacing comes from `retry_after`'s limiter
    pub fn from_parts(backoff: BackoffController, retry_after: RetryAfterController) -> Self {
        Self {
            limiter: retry_after.rate_limiter().clone(),
            backoff,
            retry_after,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    pub fn backoff(&self) -> &BackoffController {
        &self.backoff
    }

    pub fn retry_after(&self) -> &RetryAfterController {
        &self.retry_after
    }

    /// Waits until a request to the URL may be issued
    pub async fn before_request(&self, url: &str) -> UrlResult<Pacing> {
        self.retry_after.consume_if_pending(url).await
    }

    /// Clears the host's backoff after a successful response
    pub fn on_success(&self, url: &str) -> UrlResult<()> {
        let domain = extract_domain(url)?;
        self.backoff.reset_backoff(&domain);
        Ok(())
    }

    /// Applies backoff to the host after a failed request
    ///
    /// # Returns
    ///
    /// How long the backoff slept.
    pub async fn on_failure(&self, url: &str) -> UrlResult<Duration> {
        let domain = extract_domain(url)?;
        Ok(self.backoff.apply_backoff(&domain).await)
    }

    /// Handles a 429/503 response
    ///
    /// A parseable `Retry-After` value is recorded for the host's next request
    /// and returned without sleeping. Otherwise backoff is applied here and its
    /// sleep is returned.
    pub async fn on_rate_limited(&self, url: &str, retry_after: Option<&str>) -> UrlResult<Duration> {
        let domain = extract_domain(url)?;

        let directive = retry_after
            .filter(|_| self.retry_after.is_enabled())
            .and_then(RetryAfterController::parse_directive);

        match directive {
            Some(requested) => Ok(self.retry_after.record_directive(&domain, requested)),
            None => {
                tracing::debug!("{} rate limited us without a usable Retry-After", domain);
                Ok(self.backoff.apply_backoff(&domain).await)
            }
        }
    }
}
