//! Shared robots.txt cache
//!
//! One cache is built per crawl and handed to every checker by `Arc`, so a
//! site's robots.txt is fetched once and reused until it is a day old.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Default lifetime of a cached robots.txt
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// Cached robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: Arc<ParsedRobots>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content: Arc::new(content),
            fetched_at: Utc::now(),
        }
    }

    /// How long ago the robots.txt was fetched
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Robots.txt rules keyed by origin (`scheme://host:port`)
#[derive(Debug)]
pub struct RobotsCache {
    entries: DashMap<String, CachedRobots>,
    max_age: Duration,
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsCache {
    /// Creates an empty cache with the 24 hour lifetime
    pub fn new() -> Self {
        Self::with_max_age(Duration::hours(DEFAULT_MAX_AGE_HOURS))
    }

    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    /// Returns fresh rules for an origin; stale entries are evicted
    pub fn get(&self, origin: &str) -> Option<Arc<ParsedRobots>> {
        let stale = match self.entries.get(origin) {
            Some(entry) if !entry.is_stale(self.max_age) => return Some(entry.content.clone()),
            Some(_) => true,
            None => false,
        };

        if stale {
            tracing::debug!("Cached robots.txt for {} expired", origin);
            self.entries.remove(origin);
        }
        None
    }

    /// Stores rules for an origin, replacing any previous entry
    pub fn insert(&self, origin: &str, robots: ParsedRobots) -> Arc<ParsedRobots> {
        let entry = CachedRobots::new(robots);
        let content = entry.content.clone();
        self.entries.insert(origin.to_string(), entry);
        content
    }

    /// Stores a pre-built entry (used to seed or restore a cache)
    pub fn insert_entry(&self, origin: &str, entry: CachedRobots) {
        self.entries.insert(origin.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://example.com";

    #[test]
    fn test_new_entry_not_stale() {
        let entry = CachedRobots::new(ParsedRobots::allow_all());
        assert!(!entry.is_stale(Duration::hours(24)));
    }

    #[test]
    fn test_entry_stale_after_max_age() {
        let mut entry = CachedRobots::new(ParsedRobots::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(25);
        assert!(entry.is_stale(Duration::hours(24)));

        entry.fetched_at = Utc::now() - Duration::hours(23);
        assert!(!entry.is_stale(Duration::hours(24)));
    }

    #[test]
    fn test_get_returns_inserted_rules() {
        let cache = RobotsCache::new();
        assert!(cache.get(ORIGIN).is_none());

        cache.insert(ORIGIN, ParsedRobots::from_content("User-agent: *\nDisallow: /"));
        let robots = cache.get(ORIGIN).unwrap();
        assert!(!robots.is_allowed("https://example.com/x", "TestBot"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_stale_entry_evicted_on_get() {
        let cache = RobotsCache::new();
        let mut entry = CachedRobots::new(ParsedRobots::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(30);
        cache.insert_entry(ORIGIN, entry);

        assert!(cache.get(ORIGIN).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = RobotsCache::new();
        cache.insert(ORIGIN, ParsedRobots::allow_all());
        cache.clear();
        assert!(cache.is_empty());
    }
}
