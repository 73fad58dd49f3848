//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Default spacing: {}s", config.rate_limit.default_delay);
//! ```

mod parser;
mod types;
pub(crate) mod validation;

// Re-export types
pub use types::{
    AiExtractionConfig, BackoffConfig, Config, CrawlerConfig, JavaScriptConfig, PipelineConfig,
    RateLimitConfig, RetryAfterConfig, RetryPolicy, SchemaConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_domain_pattern};
