//! Content extraction strategies
//!
//! A strategy turns page content into a JSON value; the pipeline runs the
//! configured strategies by name and hands their results to a `ResultMerger`.
//! Strategies are registered as trait objects in a `StrategyRegistry`, so the
//! set of available names is fixed when the registry is built.

mod json_ld;
mod merge;
mod metadata;

pub use json_ld::JsonLdStrategy;
pub use merge::{ResultMerger, ShallowMerger};
pub use metadata::{MetadataStrategy, PageMetadata};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by extraction strategies
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Strategy(String),
}

/// A named way of pulling structured data out of a page
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Registry key, as written in `[schema] extraction-strategies`
    fn name(&self) -> &str;

    /// Extracts data from `content`
    ///
    /// # Arguments
    ///
    /// * `url` - Address of the page, for resolving relative references
    /// * `content` - The HTML to read (rendered when available)
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Value))` - Something was found
    /// * `Ok(None)` - The page holds nothing this strategy understands
    /// * `Err(ExtractError)` - The strategy failed
    async fn extract_from_content(
        &self,
        url: &str,
        content: &str,
    ) -> Result<Option<Value>, ExtractError>;
}

/// Strategies available to a pipeline, by name
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn ExtractionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `metadata` and `json_ld` strategies
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MetadataStrategy));
        registry.register(Arc::new(JsonLdStrategy));
        registry
    }

    /// Adds a strategy under its own name, returning any strategy it replaced
    pub fn register(
        &mut self,
        strategy: Arc<dyn ExtractionStrategy>,
    ) -> Option<Arc<dyn ExtractionStrategy>> {
        let name = strategy.name().to_string();
        let previous = self.strategies.insert(name.clone(), strategy);
        if previous.is_some() {
            tracing::debug!("Replaced extraction strategy {}", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExtractionStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
