/// Checks if a domain matches a wildcard pattern
///
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches the bare domain and any
///    (nested) subdomain of it
///
/// Both sides are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Picks the most specific pattern that matches `candidate`
///
/// An exact entry always wins. Among wildcard entries the longest pattern
/// wins, so `*.api.example.com` beats `*.example.com`.
pub fn best_match<'a, V>(
    entries: impl IntoIterator<Item = (&'a String, V)>,
    candidate: &str,
) -> Option<V> {
    let mut best: Option<(usize, V)> = None;

    for (pattern, value) in entries {
        if pattern == candidate {
            return Some(value);
        }
        if pattern.starts_with("*.") && matches_wildcard(pattern, candidate) {
            let better = best.as_ref().map_or(true, |(len, _)| pattern.len() > *len);
            if better {
                best = Some((pattern.len(), value));
            }
        }
    }

    best.map(|(_, value)| value)
}
