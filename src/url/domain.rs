use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the rate-limiting key of a URL string
///
/// The key is the lowercase host: scheme, port, path, query and fragment are
/// all stripped, so `https://Example.COM:8443/a?b` and `http://example.com/`
/// share a limiter.
///
/// # Examples
///
/// ```
/// use sumi_harvest::url::extract_domain;
///
/// assert_eq!(extract_domain("https://EXAMPLE.com:8080/path").unwrap(), "example.com");
/// assert!(extract_domain("not a url").is_err());
/// ```
pub fn extract_domain(url: &str) -> UrlResult<String> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
    domain_of(&parsed).ok_or(UrlError::MissingDomain)
}

/// Returns the lowercase host of an already parsed URL
pub fn domain_of(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

/// Parses a URL that the crawler is allowed to fetch (http or https)
pub fn parse_http_url(url: &str) -> UrlResult<Url> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }
    if domain_of(&parsed).is_none() {
        return Err(UrlError::MissingDomain);
    }
    Ok(parsed)
}
