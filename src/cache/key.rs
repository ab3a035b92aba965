//! Content-addressed cache keys.
//!
//! A key is the SHA-256 of a canonical JSON encoding of the task category
//! and its parameters. Object keys are sorted at every nesting level before
//! hashing, so parameter insertion order never changes the key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::types::{TaskCategory, TaskParams};

/// Compute the cache key for a task.
///
/// Returns 64 lowercase hex characters, safe to use as a file name.
pub fn cache_key(category: TaskCategory, params: &TaskParams) -> String {
    let params = params
        .iter()
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect::<Map<String, Value>>();

    let mut document = Map::new();
    document.insert("category".to_string(), Value::from(category.as_str()));
    document.insert("params".to_string(), Value::Object(params));

    // Serializing a Value cannot fail: every key is a string.
    let encoded = Value::Object(document).to_string();

    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    hex::encode(hasher.finalize())
}

/// Rebuild `value` with object keys in sorted order, recursively.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(pairs: &[(&str, Value)]) -> TaskParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn cache_key_deterministic() {
        let p = params(&[("company", json!("Oracle"))]);
        assert_eq!(
            cache_key(TaskCategory::Locate, &p),
            cache_key(TaskCategory::Locate, &p)
        );
    }

    #[test]
    fn cache_key_is_hex_sha256() {
        let key = cache_key(TaskCategory::Locate, &TaskParams::new());
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn cache_key_differs_on_category() {
        let p = params(&[("company", json!("Oracle"))]);
        assert_ne!(
            cache_key(TaskCategory::Locate, &p),
            cache_key(TaskCategory::Analyze, &p)
        );
    }

    #[test]
    fn cache_key_differs_on_value() {
        let a = params(&[("company", json!("Oracle"))]);
        let b = params(&[("company", json!("IBM"))]);
        assert_ne!(
            cache_key(TaskCategory::Locate, &a),
            cache_key(TaskCategory::Locate, &b)
        );
    }

    #[test]
    fn nested_objects_are_order_independent() {
        let mut first = Map::new();
        first.insert("tenk_url".into(), json!("a"));
        first.insert("ticker".into(), json!("ORCL"));
        let mut second = Map::new();
        second.insert("ticker".into(), json!("ORCL"));
        second.insert("tenk_url".into(), json!("a"));

        let a = params(&[("document", Value::Object(first))]);
        let b = params(&[("document", Value::Object(second))]);
        assert_eq!(
            cache_key(TaskCategory::Analyze, &a),
            cache_key(TaskCategory::Analyze, &b)
        );
    }

    #[test]
    fn array_order_matters() {
        let a = params(&[("companies", json!(["Oracle", "IBM"]))]);
        let b = params(&[("companies", json!(["IBM", "Oracle"]))]);
        assert_ne!(
            cache_key(TaskCategory::Synthesize, &a),
            cache_key(TaskCategory::Synthesize, &b)
        );
    }
}
