//! The `json_ld` strategy: `<script type="application/ld+json">` blocks

use crate::extract::{ExtractError, ExtractionStrategy};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Map, Value};

/// Extraction strategy registered as `json_ld`
///
/// One object block is returned as-is so its keys merge directly; several
/// blocks (or a top-level array) are wrapped as `{"@graph": [...]}`. Blocks
/// that are not valid JSON are skipped with a debug log.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdStrategy;

#[async_trait]
impl ExtractionStrategy for JsonLdStrategy {
    fn name(&self) -> &str {
        "json_ld"
    }

    async fn extract_from_content(
        &self,
        url: &str,
        content: &str,
    ) -> Result<Option<Value>, ExtractError> {
        let blocks = script_blocks(content)?;

        let mut items: Vec<Value> = Vec::new();
        for block in blocks {
            match serde_json::from_str::<Value>(&block) {
                Ok(Value::Array(values)) => items.extend(values),
                Ok(value) => items.push(value),
                Err(e) => tracing::debug!("Skipping malformed JSON-LD block on {}: {}", url, e),
            }
        }

        Ok(match items.len() {
            0 => None,
            1 if items[0].is_object() => items.pop(),
            _ => {
                let mut graph = Map::new();
                graph.insert("@graph".to_string(), Value::Array(items));
                Some(Value::Object(graph))
            }
        })
    }
}

fn script_blocks(content: &str) -> Result<Vec<String>, ExtractError> {
    let document = Html::parse_document(content);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
        .map_err(|e| ExtractError::Strategy(format!("bad selector: {:?}", e)))?;

    Ok(document
        .select(&selector)
        .map(|element| element.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect())
}
