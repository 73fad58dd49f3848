//! Request pacing for Sumi-Harvest
//!
//! This module provides:
//! - `RateLimiter`: minimum spacing between successive calls
//! - `DomainRateLimiter`: one limiter per host, with overrides and statistics
//! - `BackoffController`: exponential delays after failures, reset on success
//! - `RetryAfterController`: one-shot server-directed delays
//! - `Politeness`: the three bundled for a fetcher
//!
//! Every waiting operation is `async` and sleeps on the tokio timer, so it
//! can be abandoned by dropping the future (e.g. under `tokio::time::timeout`).

mod backoff;
mod domain;
mod limiter;
mod politeness;
mod retry_after;
mod stats;

pub use backoff::BackoffController;
pub use domain::{DomainRateLimiter, SHARED_LIMITER_KEY};
pub use limiter::RateLimiter;
pub use politeness::Politeness;
pub use retry_after::{Pacing, RetryAfterController};
pub use stats::{BackoffStats, DomainStats, RetryAfterStats};
