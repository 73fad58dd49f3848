//! Crawler module for page fetching and harvest coordination
//!
//! This module contains:
//! - The `HtmlFetcher` interface and its reqwest implementation
//! - HTTP client construction with the crawler's user agent
//! - The `Harvester`, which runs many URLs through one pipeline

mod coordinator;
mod fetcher;

pub use coordinator::{Harvester, HARVESTER_STAGE};
pub use fetcher::{build_http_client, FetchError, HtmlFetcher, HttpFetcher};
