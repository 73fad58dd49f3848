//! Single minimum-spacing limiter
//!
//! A `RateLimiter` enforces one minimum delay between successive calls and
//! remembers when the last call went out. The timestamp sits behind an async
//! mutex that is held across the pacing sleep, so callers sharing a limiter
//! are served one at a time and observe non-decreasing request times.

use crate::config::validation::{check_non_negative, check_positive};
use crate::{ConfigError, ConfigResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum delay between successive requests
#[derive(Debug)]
pub struct RateLimiter {
    /// Configured spacing in nanoseconds (updatable without taking the lock)
    delay_nanos: AtomicU64,

    /// Upper bound on any single wait
    max_delay: Duration,

    /// When the last request went out; `None` until first use
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter from delays expressed in seconds
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` when `delay_seconds < 0`,
    /// `max_delay_seconds <= 0` or `delay_seconds > max_delay_seconds`.
    pub fn new(delay_seconds: f64, max_delay_seconds: f64) -> ConfigResult<Self> {
        let (delay, max_delay) = validate_delays(delay_seconds, max_delay_seconds)?;
        Ok(Self::with_durations(delay, max_delay))
    }

    /// Builds a limiter from durations that were already validated
    pub(crate) fn with_durations(delay: Duration, max_delay: Duration) -> Self {
        Self {
            delay_nanos: AtomicU64::new(duration_to_nanos(delay)),
            max_delay,
            last_request: Mutex::new(None),
        }
    }

    /// Returns the configured spacing
    pub fn delay(&self) -> Duration {
        Duration::from_nanos(self.delay_nanos.load(Ordering::Acquire))
    }

    /// Returns the safety ceiling for a single wait
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Changes the spacing; the next call uses the new value
    pub fn set_delay(&self, delay_seconds: f64) -> ConfigResult<()> {
        let (delay, _) = validate_delays(delay_seconds, self.max_delay.as_secs_f64())?;
        self.delay_nanos
            .store(duration_to_nanos(delay), Ordering::Release);
        Ok(())
    }

    /// Waits until the spacing since the last request has elapsed
    ///
    /// The first call returns immediately. Later calls sleep for
    /// `min(delay - since_last, max_delay)` when needed. The last-request time
    /// is always updated to "now" once the wait is over.
    ///
    /// # Returns
    ///
    /// How long this call slept.
    pub async fn wait_if_needed(&self) -> Duration {
        let mut last_request = self.last_request.lock().await;

        let waited = match *last_request {
            None => Duration::ZERO,
            Some(last) => {
                let since_last = last.elapsed();
                let delay = self.delay();
                if since_last < delay {
                    let wait = (delay - since_last).min(self.max_delay);
                    tracing::trace!("Pacing: sleeping {:?} (since last {:?})", wait, since_last);
                    tokio::time::sleep(wait).await;
                    wait
                } else {
                    Duration::ZERO
                }
            }
        };

        *last_request = Some(Instant::now());
        waited
    }

    /// Reports how long the next call would wait, without sleeping
    pub async fn time_until_next_allowed(&self) -> Duration {
        let last_request = self.last_request.lock().await;
        match *last_request {
            None => Duration::ZERO,
            Some(last) => self
                .delay()
                .saturating_sub(last.elapsed())
                .min(self.max_delay),
        }
    }

    /// Records a request issued right now without pacing it
    pub async fn mark_request(&self) {
        *self.last_request.lock().await = Some(Instant::now());
    }

    /// Returns when the last request was recorded
    pub async fn last_request(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }

    /// Forgets the last request so the next call proceeds immediately
    pub async fn reset(&self) {
        *self.last_request.lock().await = None;
    }
}

/// Checks a spacing/ceiling pair and converts both to durations
pub(crate) fn validate_delays(
    delay_seconds: f64,
    max_delay_seconds: f64,
) -> ConfigResult<(Duration, Duration)> {
    let delay = check_non_negative("delay_seconds", delay_seconds)?;
    let max_delay = check_positive("max_delay_seconds", max_delay_seconds)?;
    if delay_seconds > max_delay_seconds {
        return Err(ConfigError::Validation(format!(
            "delay_seconds ({}) cannot exceed max_delay_seconds ({})",
            delay_seconds, max_delay_seconds
        )));
    }
    Ok((delay, max_delay))
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_validation() {
        assert!(RateLimiter::new(0.0, 1.0).is_ok());
        assert!(RateLimiter::new(1.0, 1.0).is_ok());

        assert!(RateLimiter::new(-0.1, 1.0).is_err());
        assert!(RateLimiter::new(1.0, 0.0).is_err());
        assert!(RateLimiter::new(2.0, 1.0).is_err());
        assert!(RateLimiter::new(f64::NAN, 1.0).is_err());
        assert!(RateLimiter::new(1e20, 1e21).is_err());
        assert!(RateLimiter::new(1.0, 1e300).is_err());
    }

    #[tokio::test]
    async fn test_first_call_returns_zero() {
        tokio::time::pause();

        for delay in [0.0, 0.5, 10.0] {
            let limiter = RateLimiter::new(delay, 10.0).unwrap();
            assert_eq!(limiter.wait_if_needed().await, Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn test_second_call_waits_remaining_spacing() {
        tokio::time::pause();

        let limiter = RateLimiter::new(2.0, 10.0).unwrap();
        limiter.wait_if_needed().await;

        tokio::time::advance(Duration::from_millis(500)).await;

        let start = Instant::now();
        let waited = limiter.wait_if_needed().await;

        assert_eq!(waited, Duration::from_millis(1500));
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_no_wait_after_spacing_elapsed() {
        tokio::time::pause();

        let limiter = RateLimiter::new(1.0, 10.0).unwrap();
        limiter.wait_if_needed().await;
        tokio::time::advance(Duration::from_millis(1200)).await;

        assert_eq!(limiter.wait_if_needed().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_wait_capped_by_max_delay() {
        tokio::time::pause();

        let limiter = RateLimiter::with_durations(Duration::from_secs(30), Duration::from_secs(5));
        limiter.wait_if_needed().await;

        assert_eq!(limiter.wait_if_needed().await, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_time_until_next_allowed_does_not_sleep() {
        tokio::time::pause();

        let limiter = RateLimiter::new(3.0, 10.0).unwrap();
        assert_eq!(limiter.time_until_next_allowed().await, Duration::ZERO);

        limiter.wait_if_needed().await;
        tokio::time::advance(Duration::from_secs(1)).await;

        let start = Instant::now();
        assert_eq!(limiter.time_until_next_allowed().await, Duration::from_secs(2));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_reset_behaves_like_fresh_limiter() {
        tokio::time::pause();

        let limiter = RateLimiter::new(5.0, 10.0).unwrap();
        limiter.wait_if_needed().await;
        limiter.reset().await;

        assert!(limiter.last_request().await.is_none());
        assert_eq!(limiter.wait_if_needed().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_set_delay_applies_to_next_call() {
        tokio::time::pause();

        let limiter = RateLimiter::new(1.0, 10.0).unwrap();
        limiter.wait_if_needed().await;
        limiter.set_delay(4.0).unwrap();

        assert_eq!(limiter.wait_if_needed().await, Duration::from_secs(4));
        assert!(limiter.set_delay(11.0).is_err());
        assert!(limiter.set_delay(-1.0).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        tokio::time::pause();

        let limiter = std::sync::Arc::new(RateLimiter::new(1.0, 10.0).unwrap());
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.wait_if_needed().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        assert!(times[1].duration_since(times[0]) >= Duration::from_secs(1));
        assert!(times[2].duration_since(times[1]) >= Duration::from_secs(1));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
