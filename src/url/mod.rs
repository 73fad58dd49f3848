//! URL handling module for Sumi-Harvest
//!
//! This module provides the host extraction used to key every per-domain
//! structure and the wildcard matching used by per-domain overrides.

mod domain;
mod matcher;

pub use domain::{domain_of, extract_domain, parse_http_url};
pub use matcher::{best_match, matches_wildcard};
