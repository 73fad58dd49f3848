//! Server-directed delays (`Retry-After`)
//!
//! A directive is either a number of seconds or an HTTP-date. It is capped at
//! `max-allowed-delay` and stored as a deadline for the domain it came from.
//! Every request to that domain is held until the deadline passes; the first
//! one released takes the place of normal spacing, the rest are spaced after it.

use crate::config::validation::check_positive;
use crate::config::RetryAfterConfig;
use crate::ratelimit::domain::DomainRateLimiter;
use crate::ratelimit::stats::{Counter, RetryAfterStats};
use crate::url::extract_domain;
use crate::{ConfigResult, UrlResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How a request was paced by `consume_if_pending`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// A pending server directive was slept
    RetryAfter(Duration),

    /// Normal per-domain spacing applied
    Spacing(Duration),
}

impl Pacing {
    /// Time spent waiting, whichever rule applied
    pub fn waited(&self) -> Duration {
        match self {
            Pacing::RetryAfter(waited) | Pacing::Spacing(waited) => *waited,
        }
    }
}

#[derive(Debug, Default)]
struct RetryAfterState {
    /// Requests to the domain are held until this instant
    deadline: Mutex<Option<Instant>>,
    applied: Counter,
}

impl RetryAfterState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deadline(&self) -> Option<Instant> {
        *self.lock()
    }

    /// Keeps the later of the current and the new deadline
    fn extend_to(&self, deadline: Instant) {
        let mut current = self.lock();
        if current.map_or(true, |existing| existing < deadline) {
            *current = Some(deadline);
        }
    }

    /// Clears the deadline only if it is still `expected`
    ///
    /// Exactly one of the callers released at a deadline wins.
    fn clear_if(&self, expected: Instant) -> bool {
        let mut current = self.lock();
        if *current == Some(expected) {
            *current = None;
            true
        } else {
            false
        }
    }

    fn pending(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Parses, caps and applies `Retry-After` directives per domain
#[derive(Debug)]
pub struct RetryAfterController {
    enabled: bool,
    max_allowed_delay: Duration,
    limiter: Arc<DomainRateLimiter>,
    domains: DashMap<String, Arc<RetryAfterState>>,
}

impl RetryAfterController {
    /// Creates an enabled controller on top of a domain limiter
    ///
    /// # Errors
    ///
    /// Requires `max_allowed_delay > 0`.
    pub fn new(max_allowed_delay: f64, limiter: Arc<DomainRateLimiter>) -> ConfigResult<Self> {
        let max_allowed_delay = check_positive("max_allowed_delay", max_allowed_delay)?;
        Ok(Self {
            enabled: true,
            max_allowed_delay,
            limiter,
            domains: DashMap::new(),
        })
    }

    /// Builds a controller from the `[retry-after]` section
    ///
    /// A disabled controller ignores directives; `consume_if_pending` then
    /// always falls through to normal spacing.
    pub fn from_config(
        config: &RetryAfterConfig,
        limiter: Arc<DomainRateLimiter>,
    ) -> ConfigResult<Self> {
        let mut controller = Self::new(config.max_allowed_delay, limiter)?;
        controller.enabled = config.enabled;
        Ok(controller)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the hard cap applied to every directive
    pub fn max_allowed_delay(&self) -> Duration {
        self.max_allowed_delay
    }

    /// Returns the domain limiter used for normal spacing
    pub fn rate_limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    /// Parses a `Retry-After` header value
    ///
    /// # Arguments
    ///
    /// * `value` - Either delay-seconds (`"120"`) or an HTTP-date
    ///
    /// # Returns
    ///
    /// * `Some(Duration)` - The requested delay; dates in the past yield zero
    /// * `None` - The value is not a valid directive
    pub fn parse_directive(value: &str) -> Option<Duration> {
        parse_directive_at(value, Utc::now())
    }

    fn state(&self, domain: &str) -> Arc<RetryAfterState> {
        self.domains.entry(domain.to_string()).or_default().clone()
    }

    fn cap(&self, domain: &str, requested: Duration) -> Duration {
        if requested > self.max_allowed_delay {
            tracing::warn!(
                "{} asked for a {:?} delay; capping at {:?}",
                domain,
                requested,
                self.max_allowed_delay
            );
            self.max_allowed_delay
        } else {
            requested
        }
    }

    /// Stores a directive that holds the domain's requests until it expires
    ///
    /// A directive never shortens one that is already pending.
    ///
    /// # Returns
    ///
    /// The capped delay (zero when disabled).
    pub fn record_directive(&self, domain: &str, requested: Duration) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let delay = self.cap(domain, requested);
        self.state(domain).extend_to(deadline_after(delay));
        tracing::info!("{} requested a {:?} pause before the next request", domain, delay);
        delay
    }

    /// Sleeps for a directive right away
    ///
    /// Concurrent `consume_if_pending` callers for the domain are held for the
    /// same window. Nothing remains pending for the domain afterwards.
    ///
    /// # Returns
    ///
    /// How long this call slept (the capped delay, or zero when disabled).
    pub async fn apply_delay(&self, domain: &str, requested: Duration) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let delay = self.cap(domain, requested);
        let deadline = deadline_after(delay);
        let state = self.state(domain);
        state.extend_to(deadline);

        tracing::debug!("Honoring Retry-After of {:?} for {}", delay, domain);
        tokio::time::sleep(delay).await;

        if state.clear_if(deadline) {
            state.applied.record(delay);
        }
        delay
    }

    /// Paces a request to the URL's host
    ///
    /// While a directive is pending every caller sleeps until its deadline.
    /// The first caller released clears it and sets the host's last-request
    /// time to now, so normal spacing does not add to its wait; any other
    /// caller released at the same deadline then goes through normal spacing.
    /// Without a directive this is `DomainRateLimiter::wait_if_needed`.
    pub async fn consume_if_pending(&self, url: &str) -> UrlResult<Pacing> {
        let domain = extract_domain(url)?;

        let Some(state) = self.domains.get(&domain).map(|state| state.clone()) else {
            return Ok(Pacing::Spacing(self.limiter.wait_for_domain(&domain).await));
        };

        let mut held = Duration::ZERO;
        while let Some(deadline) = state.deadline() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !remaining.is_zero() {
                tracing::debug!("Holding request to {} for Retry-After ({:?})", domain, remaining);
                tokio::time::sleep_until(deadline).await;
                held += remaining;
                continue;
            }
            // Mark before clearing so a caller that finds the directive gone
            // is already spaced after this request
            self.limiter.mark_request(&domain).await;
            if state.clear_if(deadline) {
                state.applied.record(held);
                return Ok(Pacing::RetryAfter(held));
            }
        }

        let spacing = self.limiter.wait_for_domain(&domain).await;
        if held.is_zero() {
            Ok(Pacing::Spacing(spacing))
        } else {
            Ok(Pacing::RetryAfter(held + spacing))
        }
    }

    /// Returns the directive waiting for the domain's next request, if any
    pub fn pending_delay(&self, domain: &str) -> Option<Duration> {
        self.domains.get(domain).and_then(|state| state.pending())
    }

    /// Returns directive statistics for a domain, if it ever sent one
    pub fn stats(&self, domain: &str) -> Option<RetryAfterStats> {
        self.domains.get(domain).map(|state| RetryAfterStats {
            pending: state.pending(),
            applications: state.applied.count(),
            total_delay: state.applied.total(),
        })
    }

    /// Drops pending directives and statistics for every domain
    pub fn reset_all(&self) {
        self.domains.clear();
    }
}

/// `now + delay`, saturating far in the future instead of overflowing
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .unwrap_or_else(|| now + Duration::from_secs(86400 * 365 * 30))
}

/// Parses a directive relative to a fixed "now"
pub(crate) fn parse_directive_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'+') {
        let seconds: i64 = value.parse().ok()?;
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    let when = parse_http_date(value)?;
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

/// Accepts the three date forms HTTP allows: IMF-fixdate, RFC 850 and asctime
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
