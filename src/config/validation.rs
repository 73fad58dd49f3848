use crate::config::types::{
    BackoffConfig, Config, CrawlerConfig, RateLimitConfig, RetryAfterConfig, SchemaConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use std::time::Duration;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_schema_config(&config.schema)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_backoff_config(&config.backoff)?;
    validate_retry_after_config(&config.retry_after)?;
    Ok(())
}

/// Rejects negative, non-finite and unrepresentably large values
///
/// Returns the value as a `Duration` so callers never convert unchecked seconds.
pub(crate) fn check_non_negative(name: &str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be >= 0, got {}",
            name, value
        )));
    }
    to_duration(name, value)
}

/// Rejects zero, negative, non-finite and unrepresentably large values
pub(crate) fn check_positive(name: &str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be > 0, got {}",
            name, value
        )));
    }
    to_duration(name, value)
}

fn to_duration(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Validation(format!("{} is too large to be a delay, got {}", name, value))
    })
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_pages < 1 || config.max_concurrent_pages > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_pages must be between 1 and 100, got {}",
            config.max_concurrent_pages
        )));
    }

    if config.fetch_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch_attempts must be >= 1, got {}",
            config.fetch_attempts
        )));
    }

    check_non_negative("timeout_per_page", config.timeout_per_page)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the extraction strategy list
fn validate_schema_config(config: &SchemaConfig) -> Result<(), ConfigError> {
    if config.extraction_strategies.iter().any(|s| s.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "extraction_strategies cannot contain empty names".to_string(),
        ));
    }
    Ok(())
}

/// Validates request spacing configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    check_non_negative("rate_limit.default_delay", config.default_delay)?;
    check_positive("rate_limit.max_delay", config.max_delay)?;

    if config.default_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "rate_limit.default_delay ({}) cannot exceed rate_limit.max_delay ({})",
            config.default_delay, config.max_delay
        )));
    }

    for (domain, delay) in &config.domains {
        validate_domain_pattern(domain)?;
        check_non_negative(&format!("rate_limit.domains.\"{}\"", domain), *delay)?;
        if *delay > config.max_delay {
            return Err(ConfigError::Validation(format!(
                "delay for '{}' ({}) cannot exceed rate_limit.max_delay ({})",
                domain, delay, config.max_delay
            )));
        }
    }

    Ok(())
}

/// Validates backoff configuration
fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    check_positive("backoff.base_delay", config.base_delay)?;
    check_positive("backoff.max_delay", config.max_delay)?;

    if !config.multiplier.is_finite() || config.multiplier <= 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff.multiplier must be > 1, got {}",
            config.multiplier
        )));
    }

    Ok(())
}

/// Validates Retry-After configuration
fn validate_retry_after_config(config: &RetryAfterConfig) -> Result<(), ConfigError> {
    check_positive("retry_after.max_allowed_delay", config.max_allowed_delay)?;
    Ok(())
}

/// Validates a domain pattern (supports wildcards)
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
