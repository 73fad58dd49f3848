//! HTTP fetcher implementation
//!
//! This module handles all page downloads, including:
//! - Building HTTP clients with proper user agent strings
//! - Pacing every request through the shared `Politeness` controllers
//! - Retrying transient failures with backoff
//! - Error classification
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx, HTML | Success, backoff reset |
//! | HTTP 2xx, other content type | Immediate failure |
//! | HTTP 429 / 503 | Record Retry-After (or back off), retry |
//! | HTTP 5xx | Back off, retry |
//! | Timeout / connection error | Back off, retry |
//! | Other HTTP 4xx | Immediate failure |

use crate::config::{Config, UserAgentConfig};
use crate::ratelimit::Politeness;
use crate::UrlError;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a page could not be fetched
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("rate limited (HTTP {0})")]
    RateLimited(u16),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("not an HTML page ({0})")]
    ContentType(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl FetchError {
    /// Whether trying again later could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code >= 500,
            FetchError::RateLimited(_) | FetchError::Timeout | FetchError::Connect(_) => true,
            _ => false,
        }
    }
}

/// Downloads the HTML of a page
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Limit for a single request
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `HtmlFetcher` over reqwest, paced by `Politeness`
pub struct HttpFetcher {
    client: Client,
    politeness: Arc<Politeness>,
    attempts: u32,
}

impl HttpFetcher {
    /// Creates a fetcher making at most `attempts` requests per fetch
    pub fn new(client: Client, politeness: Arc<Politeness>, attempts: u32) -> Self {
        Self {
            client,
            politeness,
            attempts: attempts.max(1),
        }
    }

    /// Creates a fetcher using `[crawler] fetch-attempts`
    pub fn from_config(config: &Config, client: Client, politeness: Arc<Politeness>) -> Self {
        Self::new(client, politeness, config.crawler.fetch_attempts)
    }

    pub fn politeness(&self) -> &Arc<Politeness> {
        &self.politeness
    }

    /// One paced request, with pacing state updated from its outcome
    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        self.politeness.before_request(url).await?;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let error = classify(e);
                if error.is_retryable() {
                    self.politeness.on_failure(url).await?;
                }
                return Err(error);
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.politeness
                .on_rate_limited(url, retry_after.as_deref())
                .await?;
            return Err(FetchError::RateLimited(status.as_u16()));
        }

        if status.is_server_error() {
            self.politeness.on_failure(url).await?;
            return Err(FetchError::Status(status.as_u16()));
        }

        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.is_empty() && !content_type.contains("html") {
            self.politeness.on_success(url)?;
            return Err(FetchError::ContentType(content_type));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.politeness.on_failure(url).await?;
                return Err(classify(e));
            }
        };

        self.politeness.on_success(url)?;
        Ok(body)
    }
}

#[async_trait]
impl HtmlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    tracing::debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.attempts,
                        url,
                        e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_connect() {
        FetchError::Connect(error.to_string())
    } else {
        FetchError::Http(error)
    }
}
