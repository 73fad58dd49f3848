//! Exponential backoff after failed requests
//!
//! Each failure against a domain increases the next delay by `multiplier`,
//! up to `max_delay`; a success resets the domain back to `base_delay`.

use crate::config::validation::check_positive;
use crate::config::BackoffConfig;
use crate::ratelimit::stats::{BackoffStats, Counter};
use crate::{ConfigError, ConfigResult};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Backoff bookkeeping for one domain
#[derive(Debug, Default)]
struct BackoffState {
    /// Consecutive failures since the last success
    retry_count: AtomicU32,

    /// Serializes concurrent backoffs against the same domain
    gate: Mutex<()>,

    applied: Counter,
}

/// Computes and applies per-domain exponential backoff
#[derive(Debug)]
pub struct BackoffController {
    enabled: bool,
    base_delay: f64,
    max_delay: f64,
    multiplier: f64,
    domains: DashMap<String, Arc<BackoffState>>,
}

impl BackoffController {
    /// Creates an enabled controller
    ///
    /// # Errors
    ///
    /// Requires `base_delay > 0`, `max_delay > 0` and `multiplier > 1`.
    pub fn new(base_delay: f64, max_delay: f64, multiplier: f64) -> ConfigResult<Self> {
        check_positive("base_delay", base_delay)?;
        check_positive("max_delay", max_delay)?;
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(ConfigError::Validation(format!(
                "multiplier must be > 1, got {}",
                multiplier
            )));
        }

        Ok(Self {
            enabled: true,
            base_delay,
            max_delay,
            multiplier,
            domains: DashMap::new(),
        })
    }

    /// Creates a controller that never waits and keeps no state
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            base_delay: 1.0,
            max_delay: 1.0,
            multiplier: 2.0,
            domains: DashMap::new(),
        }
    }

    /// Builds a controller from the `[backoff]` section
    pub fn from_config(config: &BackoffConfig) -> ConfigResult<Self> {
        let controller = Self::new(config.base_delay, config.max_delay, config.multiplier)?;
        if config.enabled {
            Ok(controller)
        } else {
            Ok(Self::disabled())
        }
    }

    /// Returns whether backoff delays are applied
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Delay for the given number of previous failures:
    /// `min(base_delay * multiplier^retry_count, max_delay)`
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let seconds = (self.base_delay * self.multiplier.powi(exponent)).min(self.max_delay);
        Duration::from_secs_f64(seconds)
    }

    /// Sleeps for the domain's current backoff delay, then counts the failure
    ///
    /// # Returns
    ///
    /// How long this call slept (always zero when disabled).
    pub async fn apply_backoff(&self, domain: &str) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }

        let state = self
            .domains
            .entry(domain.to_string())
            .or_default()
            .clone();

        let _gate = state.gate.lock().await;
        let retry_count = state.retry_count.load(Ordering::Acquire);
        let delay = self.calculate_delay(retry_count);

        tracing::debug!(
            "Backing off {:?} for {} (failure #{})",
            delay,
            domain,
            retry_count + 1
        );

        tokio::time::sleep(delay).await;

        state.retry_count.fetch_add(1, Ordering::AcqRel);
        state.applied.record(delay);

        if delay.as_secs_f64() >= self.max_delay {
            tracing::warn!("Backoff for {} has reached the {}s ceiling", domain, self.max_delay);
        }

        delay
    }

    /// Clears the failure count after a successful request
    pub fn reset_backoff(&self, domain: &str) {
        if !self.enabled {
            return;
        }
        if let Some(state) = self.domains.get(domain) {
            let previous = state.retry_count.swap(0, Ordering::AcqRel);
            if previous > 0 {
                tracing::debug!("Reset backoff for {} after {} failures", domain, previous);
            }
        }
    }

    /// Returns the domain's consecutive failure count (0 if unseen)
    pub fn retry_count(&self, domain: &str) -> u32 {
        self.domains
            .get(domain)
            .map(|state| state.retry_count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Returns backoff statistics for a domain, if it ever backed off
    pub fn stats(&self, domain: &str) -> Option<BackoffStats> {
        self.domains.get(domain).map(|state| BackoffStats {
            current_retry_count: state.retry_count.load(Ordering::Acquire),
            applications: state.applied.count(),
            total_backoff: state.applied.total(),
        })
    }

    /// Forgets all backoff state
    pub fn reset_all(&self) {
        self.domains.clear();
    }
}
