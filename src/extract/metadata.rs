//! The `metadata` strategy: title, description, headings and links
//!
//! Link extraction rules:
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document
//!
//! The canonical link is reported separately, not among the links.
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` and `data:` links
//! - Fragment-only links
//! - Anything that is not HTTP(S) after resolution

use crate::extract::{ExtractError, ExtractionStrategy};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use url::Url;

/// Document-level metadata of an HTML page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,

    /// Text of `h1` and `h2` elements in document order
    pub headings: Vec<String>,

    /// Absolute, de-duplicated link targets in document order
    pub links: Vec<String>,
}

impl PageMetadata {
    /// Parses metadata out of an HTML document
    ///
    /// # Arguments
    ///
    /// * `html` - The HTML content to parse
    /// * `base_url` - The base URL for resolving relative links
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_harvest::extract::PageMetadata;
    /// use url::Url;
    ///
    /// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
    /// let base_url = Url::parse("https://example.com/").unwrap();
    /// let metadata = PageMetadata::parse(html, &base_url);
    /// assert_eq!(metadata.title, Some("Test".to_string()));
    /// assert_eq!(metadata.links, vec!["https://example.com/page".to_string()]);
    /// ```
    pub fn parse(html: &str, base_url: &Url) -> Self {
        let document = Html::parse_document(html);

        let title = first_text(&document, "title");
        let description = first_attr(&document, "meta[name='description'][content]", "content")
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty());
        let canonical = first_attr(&document, "link[rel='canonical'][href]", "href")
            .and_then(|href| resolve_link(&href, base_url));

        Self {
            title,
            description,
            canonical,
            headings: extract_headings(&document),
            links: extract_links(&document, base_url),
        }
    }

    /// True when nothing at all was found
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.canonical.is_none()
            && self.headings.is_empty()
            && self.links.is_empty()
    }
}

/// Extraction strategy registered as `metadata`
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataStrategy;

#[async_trait]
impl ExtractionStrategy for MetadataStrategy {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn extract_from_content(
        &self,
        url: &str,
        content: &str,
    ) -> Result<Option<Value>, ExtractError> {
        let base_url = Url::parse(url)?;
        let metadata = PageMetadata::parse(content, &base_url);
        if metadata.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::to_value(metadata)?))
    }
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;

    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr))
        .map(str::to_string)
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_headings(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("h1, h2") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| {
            element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .collect()
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| resolve_link(href, base_url))
            {
                if !links.contains(&absolute_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves an href against the page URL, dropping non-navigational links
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_title_is_trimmed() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(metadata.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_description_and_canonical() {
        let html = r#"<html><head>
            <meta name="description" content=" Widgets and more ">
            <link rel="canonical" href="/canonical">
            </head><body></body></html>"#;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(metadata.description.as_deref(), Some("Widgets and more"));
        assert_eq!(
            metadata.canonical.as_deref(),
            Some("https://example.com/canonical")
        );
    }

    #[test]
    fn test_headings_collapse_whitespace() {
        let html = r#"<html><body><h1>Big
            <em>Title</em></h1><h2>Sub</h2><h3>Ignored</h3></body></html>"#;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(metadata.headings, vec!["Big Title", "Sub"]);
    }

    #[test]
    fn test_relative_links_resolved() {
        let html = r#"<html><body><a href="/other">A</a><a href="sibling">B</a></body></html>"#;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(
            metadata.links,
            vec!["https://example.com/other", "https://example.com/sibling"]
        );
    }

    #[test]
    fn test_excluded_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,hi">data</a>
            <a href="#section">jump</a>
            <a href="/file.pdf" download>download</a>
            <a href="ftp://example.com/file">ftp</a>
            <a href="/kept">kept</a>
            </body></html>"##;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(metadata.links, vec!["https://example.com/kept"]);
    }

    #[test]
    fn test_duplicate_links_collapsed() {
        let html = r#"<html><body><a href="/a">1</a><a href="https://example.com/a">2</a></body></html>"#;
        let metadata = PageMetadata::parse(html, &base_url());
        assert_eq!(metadata.links.len(), 1);
    }

    #[tokio::test]
    async fn test_strategy_returns_none_for_empty_page() {
        let result = MetadataStrategy
            .extract_from_content("https://example.com/", "<html><body></body></html>")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_strategy_serializes_metadata() {
        let result = MetadataStrategy
            .extract_from_content(
                "https://example.com/",
                "<html><head><title>Hi</title></head></html>",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result["title"], "Hi");
        assert!(result.get("description").is_none());
        assert_eq!(result["links"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_strategy_rejects_bad_url() {
        let result = MetadataStrategy
            .extract_from_content("not a url", "<html></html>")
            .await;
        assert!(matches!(result, Err(ExtractError::BaseUrl(_))));
    }
}
