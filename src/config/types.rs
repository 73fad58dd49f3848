use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
///
/// Every section is optional in the TOML file; missing sections fall back to
/// their `Default` implementation so stages can read options defensively.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub javascript: JavaScriptConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(rename = "ai-extraction", default)]
    pub ai_extraction: AiExtractionConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(rename = "retry-after", default)]
    pub retry_after: RetryAfterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Whether robots.txt rules are consulted before fetching
    #[serde(rename = "respect-robots-txt")]
    pub respect_robots_txt: bool,

    /// Overall deadline for one page, in seconds (0 disables the deadline)
    #[serde(rename = "timeout-per-page")]
    pub timeout_per_page: f64,

    /// Maximum number of pages processed concurrently
    #[serde(rename = "max-concurrent-pages")]
    pub max_concurrent_pages: u32,

    /// Number of HTTP attempts per fetch before giving up
    #[serde(rename = "fetch-attempts")]
    pub fetch_attempts: u32,
}

impl CrawlerConfig {
    /// Returns the per-page deadline, or `None` when it is disabled
    ///
    /// A value too large to be a `Duration` also means no deadline.
    pub fn page_timeout(&self) -> Option<Duration> {
        if self.timeout_per_page > 0.0 {
            Duration::try_from_secs_f64(self.timeout_per_page).ok()
        } else {
            None
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            respect_robots_txt: true,
            timeout_per_page: 60.0,
            max_concurrent_pages: 8,
            fetch_attempts: 3,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// JavaScript rendering options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JavaScriptConfig {
    #[serde(rename = "enable-rendering")]
    pub enable_rendering: bool,

    #[serde(rename = "timeout-seconds")]
    pub timeout_seconds: u64,
}

impl Default for JavaScriptConfig {
    fn default() -> Self {
        Self {
            enable_rendering: false,
            timeout_seconds: 30,
        }
    }
}

/// Extraction schema options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Strategy names, run in this order
    #[serde(rename = "extraction-strategies")]
    pub extraction_strategies: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            extraction_strategies: vec!["json_ld".to_string(), "metadata".to_string()],
        }
    }
}

/// AI-based extraction options
///
/// Keys other than `enabled` and `strategy` are provider specific and kept
/// verbatim in `provider`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiExtractionConfig {
    pub enabled: bool,

    /// Registry name of the strategy run when AI extraction is enabled
    pub strategy: String,

    #[serde(flatten)]
    pub provider: toml::Table,
}

impl Default for AiExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: "ai".to_string(),
            provider: toml::Table::new(),
        }
    }
}

/// Request spacing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum spacing between requests to one domain, in seconds
    #[serde(rename = "default-delay")]
    pub default_delay: f64,

    /// Safety ceiling for any single pacing wait, in seconds
    #[serde(rename = "max-delay")]
    pub max_delay: f64,

    /// When false, every host shares a single limiter
    #[serde(rename = "per-domain")]
    pub per_domain: bool,

    /// Per-domain delay overrides (keys may use `*.example.com`)
    pub domains: BTreeMap<String, f64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay: 1.0,
            max_delay: 60.0,
            per_domain: true,
            domains: BTreeMap::new(),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub enabled: bool,

    #[serde(rename = "base-delay")]
    pub base_delay: f64,

    #[serde(rename = "max-delay")]
    pub max_delay: f64,

    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: 1.0,
            max_delay: 60.0,
            multiplier: 2.0,
        }
    }
}

/// Server `Retry-After` handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryAfterConfig {
    pub enabled: bool,

    /// Hard cap on any server-requested delay, in seconds
    #[serde(rename = "max-allowed-delay")]
    pub max_allowed_delay: f64,
}

impl Default for RetryAfterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_allowed_delay: 300.0,
        }
    }
}

/// What a pipeline does when a stage asks for a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryPolicy {
    /// Start again from the first stage with fresh page state
    #[default]
    FullRestart,
    /// Keep the context and start again at the stage that asked for the retry
    ResumeFromFailedStage,
}

/// Pipeline run options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "retry-policy")]
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_policy: RetryPolicy::FullRestart,
        }
    }
}
