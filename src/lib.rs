//! Sumi-Harvest: the control plane of a polite content crawler
//!
//! This crate decides *when* a request to a site may be issued and *how* a
//! multi-step extraction job proceeds once a page is in hand. It combines a
//! stage-based extraction pipeline with an adaptive per-domain rate limiter
//! (minimum spacing, exponential backoff and server `Retry-After` directives).

pub mod config;
pub mod crawler;
pub mod extract;
pub mod pipeline;
pub mod ratelimit;
pub mod report;
pub mod robots;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("A stage named '{0}' is already registered")]
    DuplicateStage(String),

    #[error("Stage position {position} is out of range (pipeline has {len} stages)")]
    StagePosition { position: usize, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// Rate limiter construction failures are reported here as well, so that an
/// invalid delay is rejected when the limiter is built, never when it is used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{ExtractionPipeline, PipelineStage, ScrapingContext, StageResult};
pub use ratelimit::{BackoffController, DomainRateLimiter, Politeness, RateLimiter, RetryAfterController};
pub use url::extract_domain;
