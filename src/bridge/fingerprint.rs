//! Structural fingerprints for translation-cache keys.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash of a payload's *shape*: key names, nesting, and JSON types, never
/// values. Two payloads with the same structure share a fingerprint; any
/// difference in key set, nesting, or type diverges.
pub fn structural_fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(shape_of(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Canonical shape string: object keys sorted, array element shapes
/// deduplicated in order.
fn shape_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => {
            let mut shapes: Vec<String> = items.iter().map(shape_of).collect();
            shapes.dedup();
            format!("[{}]", shapes.join("|"))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .iter()
                .map(|k| format!("{}:{}", k, shape_of(&map[k.as_str()])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_same_shape_different_values_collide() {
        let a = json!({"role": "user", "content": "hello"});
        let b = json!({"role": "assistant", "content": "completely different"});
        assert_eq!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        assert_eq!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn test_different_key_sets_diverge() {
        let a = json!({"role": "user", "content": "x"});
        let b = json!({"role": "user", "text": "x"});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn test_type_changes_diverge() {
        let a = json!({"count": 1});
        let b = json!({"count": "1"});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn test_nesting_diverges() {
        let a = json!({"meta": {"id": "x"}});
        let b = json!({"meta": "x"});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));
    }

    #[test]
    fn test_array_element_shapes_matter() {
        let a = json!({"items": [{"id": 1}]});
        let b = json!({"items": ["1"]});
        assert_ne!(structural_fingerprint(&a), structural_fingerprint(&b));

        // More elements of the same shape do not change the fingerprint.
        let c = json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}]});
        assert_eq!(structural_fingerprint(&a), structural_fingerprint(&c));
    }
}
