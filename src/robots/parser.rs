//! Robots.txt rules
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. `Crawl-delay`
//! is not part of its matcher, so groups are scanned here for it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
}

impl ParsedRobots {
    /// Wraps raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Rules that allow everything
    ///
    /// Used when the site has no robots.txt (any 4xx answer).
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks whether `url` may be fetched by `user_agent`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the page
    /// * `user_agent` - Product token of the crawler (e.g. "SumiHarvest")
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the `Crawl-delay` that applies to `user_agent`
    ///
    /// A group naming the agent wins over the `*` group. Agent names match
    /// case-insensitively as a substring of `user_agent`.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_lowercase();

        let mut group_agents: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut specific: Option<f64> = None;
        let mut wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group
                    if in_rules {
                        group_agents.clear();
                        in_rules = false;
                    }
                    group_agents.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if !delay.is_finite() || delay < 0.0 {
                        continue;
                    }
                    for name in &group_agents {
                        if name == "*" {
                            wildcard.get_or_insert(delay);
                        } else if !name.is_empty() && agent.contains(name.as_str()) {
                            specific.get_or_insert(delay);
                        }
                    }
                }
                _ => in_rules = true,
            }
        }

        // Values too large for a Duration saturate; callers cap them anyway
        specific
            .or(wildcard)
            .map(|seconds| Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX))
    }
}
