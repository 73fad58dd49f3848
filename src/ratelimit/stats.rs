//! Statistics snapshots for the pacing controllers
//!
//! Counters live in atomics next to each domain's state; these types are the
//! plain copies handed out to callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Request spacing statistics for one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainStats {
    /// Number of `wait_if_needed` calls recorded for the domain
    pub total_requests: u64,

    /// Sum of all waits imposed on the domain
    pub total_wait: Duration,
}

impl DomainStats {
    /// Mean wait per request (zero when no request was made)
    pub fn average_wait(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_wait.as_nanos() / u128::from(self.total_requests);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Backoff statistics for one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffStats {
    /// Consecutive failures since the last success
    pub current_retry_count: u32,

    /// Number of times a backoff delay was applied
    pub applications: u64,

    /// Total time spent in backoff
    pub total_backoff: Duration,
}

/// Retry-After statistics for one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryAfterStats {
    /// Server delay still waiting to be consumed by the next request
    pub pending: Option<Duration>,

    /// Number of server delays that were slept
    pub applications: u64,

    /// Total time spent honoring server delays
    pub total_delay: Duration,
}

/// Lock-free accumulator used by every controller
#[derive(Debug, Default)]
pub(crate) struct Counter {
    count: AtomicU64,
    total_micros: AtomicU64,
}

impl Counter {
    pub(crate) fn record(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros.load(Ordering::Relaxed))
    }
}
