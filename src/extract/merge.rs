use serde_json::{Map, Value};

/// Combines per-strategy results into one final result
pub trait ResultMerger: Send + Sync {
    /// `results` arrive in precedence order, highest first
    fn merge(&self, results: &[(&str, &Value)]) -> Value;
}

/// Shallow, first-writer-wins merge of object results
///
/// Keys of object results are copied to the top level; a key already set by
/// a higher-precedence strategy is kept. Non-object results are stored under
/// their strategy name. The per-strategy sources are listed under `_sources`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerger;

impl ResultMerger for ShallowMerger {
    fn merge(&self, results: &[(&str, &Value)]) -> Value {
        let mut merged = Map::new();
        let mut sources = Vec::with_capacity(results.len());

        for (strategy, value) in results {
            sources.push(Value::from(*strategy));
            match value {
                Value::Object(fields) => {
                    for (key, field) in fields {
                        merged.entry(key.clone()).or_insert_with(|| field.clone());
                    }
                }
                other => {
                    merged
                        .entry(strategy.to_string())
                        .or_insert_with(|| (*other).clone());
                }
            }
        }

        merged.insert("_sources".to_string(), Value::Array(sources));
        Value::Object(merged)
    }
}
