//! Per-domain request spacing
//!
//! This module handles:
//! - Lazily creating one `RateLimiter` per host on first use
//! - Per-domain delay overrides (exact hosts or `*.example.com` patterns)
//! - Per-domain request and wait statistics
//!
//! Domains live in a sharded `DashMap`; each entry carries its own lock, so a
//! sleeping request to one busy domain never blocks an unrelated domain.

use crate::config::validation::check_non_negative;
use crate::config::RateLimitConfig;
use crate::ratelimit::limiter::{validate_delays, RateLimiter};
use crate::ratelimit::stats::{Counter, DomainStats};
use crate::url::{best_match, extract_domain};
use crate::{ConfigError, ConfigResult, UrlResult};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Key under which all hosts share one limiter when per-domain mode is off
pub const SHARED_LIMITER_KEY: &str = "*";

/// A limiter plus the statistics recorded against it
#[derive(Debug)]
struct DomainEntry {
    limiter: RateLimiter,
    waits: Counter,
}

/// A collection of `RateLimiter`s keyed by host
#[derive(Debug)]
pub struct DomainRateLimiter {
    /// Spacing used for hosts without an override
    default_delay: Duration,

    /// Safety ceiling for every limiter
    max_delay: Duration,

    /// When false, every host maps to `SHARED_LIMITER_KEY`
    per_domain: bool,

    /// Configured per-domain delays
    overrides: RwLock<BTreeMap<String, Duration>>,

    /// Lazily created limiters
    limiters: DashMap<String, Arc<DomainEntry>>,
}

impl DomainRateLimiter {
    /// Creates a domain limiter with a global default spacing
    ///
    /// # Errors
    ///
    /// Fails with a configuration error under the same rules as `RateLimiter::new`.
    pub fn new(default_delay: f64, max_delay: f64, per_domain: bool) -> ConfigResult<Self> {
        let (default_delay_duration, max_delay_duration) = validate_delays(default_delay, max_delay)?;

        tracing::debug!(
            "Creating domain rate limiter (default {}s, ceiling {}s, per-domain: {})",
            default_delay,
            max_delay,
            per_domain
        );

        Ok(Self {
            default_delay: default_delay_duration,
            max_delay: max_delay_duration,
            per_domain,
            overrides: RwLock::new(BTreeMap::new()),
            limiters: DashMap::new(),
        })
    }

    /// Builds a domain limiter from the `[rate-limit]` section
    pub fn from_config(config: &RateLimitConfig) -> ConfigResult<Self> {
        let limiter = Self::new(config.default_delay, config.max_delay, config.per_domain)?;
        for (domain, delay) in &config.domains {
            limiter.configure_domain_delay(domain, *delay)?;
        }
        Ok(limiter)
    }

    /// Returns whether each host gets its own limiter
    pub fn is_per_domain(&self) -> bool {
        self.per_domain
    }

    /// Returns the global default spacing
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Returns the ceiling that caps every wait and every configured delay
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns the spacing that applies to `domain`
    pub fn delay_for(&self, domain: &str) -> Duration {
        if !self.per_domain {
            return self.default_delay;
        }
        let overrides = self
            .overrides
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        best_match(overrides.iter(), domain)
            .copied()
            .unwrap_or(self.default_delay)
    }

    /// Maps a host to the key of the limiter that paces it
    fn key_for(&self, domain: &str) -> String {
        if self.per_domain {
            domain.to_string()
        } else {
            SHARED_LIMITER_KEY.to_string()
        }
    }

    /// Gets or creates the entry for a host, releasing the map shard before returning
    fn entry(&self, domain: &str) -> Arc<DomainEntry> {
        let key = self.key_for(domain);
        if let Some(existing) = self.limiters.get(&key) {
            return existing.clone();
        }

        let delay = self.delay_for(domain).min(self.max_delay);
        self.limiters
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!("Creating limiter for {} ({:?} spacing)", domain, delay);
                Arc::new(DomainEntry {
                    limiter: RateLimiter::with_durations(delay, self.max_delay),
                    waits: Counter::default(),
                })
            })
            .clone()
    }

    /// Waits until a request to the URL's host is allowed
    ///
    /// # Returns
    ///
    /// * `Ok(Duration)` - How long this call slept
    /// * `Err(UrlError)` - The URL has no usable host
    pub async fn wait_if_needed(&self, url: &str) -> UrlResult<Duration> {
        let domain = extract_domain(url)?;
        Ok(self.wait_for_domain(&domain).await)
    }

    /// Waits until a request to `domain` is allowed
    pub async fn wait_for_domain(&self, domain: &str) -> Duration {
        let entry = self.entry(domain);
        let waited = entry.limiter.wait_if_needed().await;
        entry.waits.record(waited);

        if waited > Duration::ZERO {
            tracing::debug!("Waited {:?} before requesting {}", waited, domain);
        }
        waited
    }

    /// Reports the remaining wait for the URL's host without sleeping
    pub async fn time_until_next_allowed(&self, url: &str) -> UrlResult<Duration> {
        let domain = extract_domain(url)?;
        let key = self.key_for(&domain);
        let entry = self.limiters.get(&key).map(|e| e.clone());
        Ok(match entry {
            Some(entry) => entry.limiter.time_until_next_allowed().await,
            None => Duration::ZERO,
        })
    }

    /// Records a request to `domain` issued right now, without pacing it
    pub async fn mark_request(&self, domain: &str) {
        self.entry(domain).limiter.mark_request().await;
    }

    /// Sets or updates the spacing for one domain (or `*.` pattern)
    ///
    /// Existing limiters affected by the change pick it up on their next call.
    ///
    /// # Errors
    ///
    /// Rejects an empty domain, a negative delay, and a delay above the ceiling.
    pub fn configure_domain_delay(&self, domain: &str, seconds: f64) -> ConfigResult<()> {
        let domain = domain.trim().to_lowercase();
        if domain.is_empty() {
            return Err(ConfigError::Validation(
                "domain cannot be empty".to_string(),
            ));
        }
        let delay = check_non_negative(&format!("delay for '{}'", domain), seconds)?;
        if delay > self.max_delay {
            return Err(ConfigError::Validation(format!(
                "delay for '{}' ({}s) cannot exceed the {:?} ceiling",
                domain, seconds, self.max_delay
            )));
        }

        self.overrides
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(domain.clone(), delay);

        if self.per_domain {
            // Collect first so no shard is held while updating
            let existing: Vec<(String, Arc<DomainEntry>)> = self
                .limiters
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect();
            for (host, entry) in existing {
                let delay = self.delay_for(&host);
                if delay != entry.limiter.delay() {
                    entry.limiter.set_delay(delay.as_secs_f64())?;
                }
            }
        } else {
            tracing::debug!(
                "Per-domain mode is off; override for {} is stored but unused",
                domain
            );
        }

        tracing::info!("Configured {}s spacing for {}", seconds, domain);
        Ok(())
    }

    /// Returns the configured per-domain overrides
    pub fn domain_delays(&self) -> BTreeMap<String, f64> {
        self.overrides
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(domain, delay)| (domain.clone(), delay.as_secs_f64()))
            .collect()
    }

    /// Forgets all state for a domain; its next request proceeds immediately
    pub fn reset_domain(&self, domain: &str) {
        let key = self.key_for(&domain.to_lowercase());
        if self.limiters.remove(&key).is_some() {
            tracing::debug!("Reset rate limiter state for {}", key);
        }
    }

    /// Forgets the state of every domain
    pub fn reset_all(&self) {
        self.limiters.clear();
        tracing::debug!("Reset rate limiter state for all domains");
    }

    /// Returns request statistics for a domain, if it has been seen
    pub fn stats(&self, domain: &str) -> Option<DomainStats> {
        let key = self.key_for(&domain.to_lowercase());
        self.limiters.get(&key).map(|entry| DomainStats {
            total_requests: entry.waits.count(),
            total_wait: entry.waits.total(),
        })
    }

    /// Returns statistics for every known domain, sorted by domain
    pub fn all_stats(&self) -> Vec<(String, DomainStats)> {
        let mut stats: Vec<(String, DomainStats)> = self
            .limiters
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    DomainStats {
                        total_requests: entry.waits.count(),
                        total_wait: entry.waits.total(),
                    },
                )
            })
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    /// Returns the number of domains with live state
    pub fn tracked_domains(&self) -> usize {
        self.limiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_construction_validation() {
        assert!(DomainRateLimiter::new(1.0, 10.0, true).is_ok());
        assert!(DomainRateLimiter::new(-1.0, 10.0, true).is_err());
        assert!(DomainRateLimiter::new(1.0, 0.0, true).is_err());
        assert!(DomainRateLimiter::new(11.0, 10.0, true).is_err());
    }

    #[test]
    fn test_huge_delays_are_configuration_errors() {
        assert!(matches!(
            DomainRateLimiter::new(1e20, 1e21, true),
            Err(ConfigError::Validation(_))
        ));

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        assert!(limiter.configure_domain_delay("slow.test", 1e20).is_err());
        assert_eq!(limiter.delay_for("slow.test"), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_same_domain_is_spaced() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        assert_eq!(
            limiter.wait_if_needed("https://example.com/a").await.unwrap(),
            Duration::ZERO
        );
        assert_eq!(
            limiter.wait_if_needed("https://EXAMPLE.com:8443/b").await.unwrap(),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_different_domains_are_independent() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        limiter.wait_if_needed("https://a.example.com/").await.unwrap();

        let start = Instant::now();
        let waited = limiter.wait_if_needed("https://b.example.com/").await.unwrap();
        assert_eq!(waited, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_shared_mode_paces_all_hosts_together() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, false).unwrap();
        limiter.wait_if_needed("https://a.example.com/").await.unwrap();
        let waited = limiter.wait_if_needed("https://b.example.com/").await.unwrap();

        assert_eq!(waited, Duration::from_secs(1));
        assert_eq!(limiter.tracked_domains(), 1);
        assert_eq!(limiter.stats("anything.example").unwrap().total_requests, 2);
    }

    #[tokio::test]
    async fn test_domain_override_and_wildcard() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        limiter.configure_domain_delay("slow.test", 2.0).unwrap();
        limiter.configure_domain_delay("*.cdn.test", 0.25).unwrap();

        assert_eq!(limiter.delay_for("slow.test"), Duration::from_secs(2));
        assert_eq!(limiter.delay_for("img.cdn.test"), Duration::from_millis(250));
        assert_eq!(limiter.delay_for("other.test"), Duration::from_secs(1));

        limiter.wait_if_needed("https://slow.test/").await.unwrap();
        assert_eq!(
            limiter.wait_if_needed("https://slow.test/").await.unwrap(),
            Duration::from_secs(2)
        );
    }

    #[tokio::test]
    async fn test_reconfigure_updates_existing_limiter() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        limiter.wait_if_needed("https://example.com/").await.unwrap();
        limiter.configure_domain_delay("example.com", 3.0).unwrap();

        assert_eq!(
            limiter.wait_if_needed("https://example.com/").await.unwrap(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_configure_rejects_invalid_values() {
        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        assert!(limiter.configure_domain_delay("", 1.0).is_err());
        assert!(limiter.configure_domain_delay("   ", 1.0).is_err());
        assert!(limiter.configure_domain_delay("example.com", -0.5).is_err());
        assert!(limiter.configure_domain_delay("example.com", 11.0).is_err());
        assert!(limiter.domain_delays().is_empty());
    }

    #[tokio::test]
    async fn test_reset_domain_is_like_new() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(5.0, 10.0, true).unwrap();
        limiter.wait_if_needed("https://example.com/").await.unwrap();
        limiter.reset_domain("example.com");

        assert!(limiter.stats("example.com").is_none());
        assert_eq!(
            limiter.wait_if_needed("https://example.com/").await.unwrap(),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_reset_all() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(5.0, 10.0, true).unwrap();
        limiter.wait_if_needed("https://a.test/").await.unwrap();
        limiter.wait_if_needed("https://b.test/").await.unwrap();
        limiter.reset_all();

        assert_eq!(limiter.tracked_domains(), 0);
    }

    #[tokio::test]
    async fn test_stats_track_requests_and_waits() {
        tokio::time::pause();

        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        for _ in 0..3 {
            limiter.wait_if_needed("https://example.com/").await.unwrap();
        }

        let stats = limiter.stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_wait, Duration::from_secs(2));
        assert_eq!(stats.average_wait(), Duration::from_nanos(666_666_666));

        let all = limiter.all_stats();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "example.com");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        assert!(limiter.wait_if_needed("not a url").await.is_err());
    }

    #[tokio::test]
    async fn test_time_until_next_allowed_for_unknown_domain() {
        let limiter = DomainRateLimiter::new(1.0, 10.0, true).unwrap();
        assert_eq!(
            limiter
                .time_until_next_allowed("https://never.test/")
                .await
                .unwrap(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_from_config_applies_overrides() {
        let mut config = RateLimitConfig::default();
        config.domains.insert("slow.test".to_string(), 4.0);

        let limiter = DomainRateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.delay_for("slow.test"), Duration::from_secs(4));
        assert_eq!(limiter.delay_for("fast.test"), Duration::from_secs(1));
    }
}
