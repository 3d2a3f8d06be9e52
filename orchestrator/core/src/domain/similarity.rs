// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Parameter Similarity
//!
//! Structural comparison of JSON parameter payloads plus the canonical form
//! used for hashing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Minimum similarity for a stored record to count as "similar".
pub const SIMILARITY_FLOOR: f64 = 0.3;

const KEY_WEIGHT: f64 = 0.3;
const VALUE_WEIGHT: f64 = 0.7;

/// Recursively sort object keys. With `drop_nulls`, null members are removed.
pub fn canonicalize(value: &Value, drop_nulls: bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                let member = &map[key.as_str()];
                if drop_nulls && member.is_null() {
                    continue;
                }
                out.insert(key.clone(), canonicalize(member, drop_nulls));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !(drop_nulls && v.is_null()))
                .map(|v| canonicalize(v, drop_nulls))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of the key-sorted JSON encoding of `params`.
pub fn params_hash(params: &Value) -> String {
    sha256_hex(canonicalize(params, false).to_string().as_bytes())
}

/// Similarity in `[0, 1]`.
///
/// Objects score key overlap (Jaccard, weight 0.3) plus the mean recursive
/// similarity of shared keys (weight 0.7). Arrays compare positionally over
/// the longer length. Numbers score relative closeness; other scalars score 1
/// only when equal.
pub fn structural_similarity(a: &Value, b: &Value) -> f64 {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            if left.is_empty() && right.is_empty() {
                return 1.0;
            }
            let shared: Vec<&String> = left.keys().filter(|k| right.contains_key(*k)).collect();
            let union = left.len() + right.len() - shared.len();
            let key_similarity = shared.len() as f64 / union as f64;
            let value_similarity = if shared.is_empty() {
                0.0
            } else {
                shared
                    .iter()
                    .map(|k| structural_similarity(&left[k.as_str()], &right[k.as_str()]))
                    .sum::<f64>()
                    / shared.len() as f64
            };
            KEY_WEIGHT * key_similarity + VALUE_WEIGHT * value_similarity
        }
        (Value::Array(left), Value::Array(right)) => {
            let longest = left.len().max(right.len());
            if longest == 0 {
                return 1.0;
            }
            left.iter()
                .zip(right.iter())
                .map(|(x, y)| structural_similarity(x, y))
                .sum::<f64>()
                / longest as f64
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) if x == y => 1.0,
            (Some(x), Some(y)) => {
                let scale = x.abs().max(y.abs());
                if scale == 0.0 || !scale.is_finite() {
                    0.0
                } else {
                    (1.0 - (x - y).abs() / scale).clamp(0.0, 1.0)
                }
            }
            _ => 0.0,
        },
        (x, y) => {
            if x == y {
                1.0
            } else {
                0.0
            }
        }
    }
}

/// Size and nesting summary of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureSummary {
    pub depth: usize,
    pub key_count: usize,
    pub leaf_count: usize,
    pub payload_bytes: usize,
}

pub fn summarize(value: &Value) -> StructureSummary {
    fn walk(value: &Value, depth: usize, summary: &mut StructureSummary) {
        summary.depth = summary.depth.max(depth);
        match value {
            Value::Object(map) => {
                summary.key_count += map.len();
                for member in map.values() {
                    walk(member, depth + 1, summary);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, depth + 1, summary);
                }
            }
            _ => summary.leaf_count += 1,
        }
    }

    let mut summary = StructureSummary {
        depth: 0,
        key_count: 0,
        leaf_count: 0,
        payload_bytes: value.to_string().len(),
    };
    walk(value, 0, &mut summary);
    summary
}

/// Replace every leaf with its type name, keeping keys and nesting.
fn shape(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), shape(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(shape).collect()),
        Value::Null => Value::String("null".into()),
        Value::Bool(_) => Value::String("bool".into()),
        Value::Number(_) => Value::String("number".into()),
        Value::String(_) => Value::String("string".into()),
    }
}

/// Hash of the payload's shape: equal for payloads that differ only in leaf values.
pub fn shape_digest(value: &Value) -> String {
    sha256_hex(canonicalize(&shape(value), false).to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_key_order() {
        let a = json!({ "b": 1, "a": { "y": true, "x": [1, 2] } });
        let b = json!({ "a": { "x": [1, 2], "y": true }, "b": 1 });
        assert_eq!(params_hash(&a), params_hash(&b));
        assert_eq!(params_hash(&a).len(), 64);
        assert_ne!(params_hash(&a), params_hash(&json!({ "b": 2 })));
    }

    #[test]
    fn test_identical_payloads_are_fully_similar() {
        let p = json!({ "query": "SELECT 1", "dataset": "prod", "limit": 10 });
        assert!((structural_similarity(&p, &p) - 1.0).abs() < 1e-12);
        assert_eq!(structural_similarity(&json!({}), &json!({})), 1.0);
    }

    #[test]
    fn test_disjoint_payloads_are_dissimilar() {
        let a = json!({ "query": "SELECT 1" });
        let b = json!({ "branch": "main" });
        assert_eq!(structural_similarity(&a, &b), 0.0);
        assert!(structural_similarity(&a, &b) < SIMILARITY_FLOOR);
    }

    #[test]
    fn test_same_keys_different_values_clear_floor() {
        let a = json!({ "query": "SELECT 1", "dataset": "prod" });
        let b = json!({ "query": "SELECT 2", "dataset": "prod" });
        let similarity = structural_similarity(&a, &b);
        // keys 0.3 + values 0.7 * (0 + 1) / 2
        assert!((similarity - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_numbers_score_relative_closeness() {
        assert!((structural_similarity(&json!(90), &json!(100)) - 0.9).abs() < 1e-12);
        assert_eq!(structural_similarity(&json!(0), &json!(0)), 1.0);
    }

    #[test]
    fn test_canonicalize_drops_nulls_on_request() {
        let p = json!({ "b": null, "a": [1, null] });
        assert_eq!(canonicalize(&p, true), json!({ "a": [1] }));
        assert_eq!(canonicalize(&p, false), p);
    }

    #[test]
    fn test_summary_and_shape() {
        let p = json!({ "a": { "b": [1, 2] }, "c": "x" });
        let summary = summarize(&p);
        assert_eq!(summary.depth, 3);
        assert_eq!(summary.key_count, 3);
        assert_eq!(summary.leaf_count, 3);

        let q = json!({ "c": "y", "a": { "b": [7, 8] } });
        assert_eq!(shape_digest(&p), shape_digest(&q));
        assert_ne!(shape_digest(&p), shape_digest(&json!({ "c": 1 })));
    }
}
