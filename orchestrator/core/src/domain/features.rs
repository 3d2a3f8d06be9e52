// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Feature Extraction
//!
//! Turns a tool invocation into the fixed-length vector consumed by the
//! numeric predictor. Domain-specific extractors plug in behind
//! [`FeatureExtractor`]; [`HeuristicFeatureExtractor`] inspects the JSON
//! payload generically.

use crate::domain::similarity::summarize;
use serde_json::Value;

pub const FEATURE_COUNT: usize = 10;

pub type FeatureVector = [f64; FEATURE_COUNT];

/// Feature positions, in input-layer order.
pub mod index {
    pub const SYNTAX_RISK: usize = 0;
    pub const COST_RISK: usize = 1;
    pub const PERMISSION_RISK: usize = 2;
    pub const COMPLEXITY: usize = 3;
    pub const CROSS_BOUNDARY: usize = 4;
    pub const HAS_JOIN: usize = 5;
    pub const HAS_WILDCARD: usize = 6;
    pub const HAS_LIMIT: usize = 7;
    pub const ESTIMATED_ROWS: usize = 8;
    pub const INPUT_LENGTH: usize = 9;
}

pub trait FeatureExtractor: Send + Sync {
    /// Every component must be finite and lie in `[0, 1]`.
    fn extract(&self, tool: &str, params: &Value) -> FeatureVector;
}

const DESTRUCTIVE_KEYWORDS: &[&str] = &[
    "drop ", "delete ", "truncate ", "alter ", "grant ", "revoke ", "rm -rf", "--force",
    "push -f", "reset --hard", "sudo ", "chmod ", "chown ",
];

const ROW_KEYS: &[&str] = &["rows", "limit", "count", "size", "max_results", "maxresults"];

const BOUNDARY_KEYS: &[&str] = &["project", "remote", "host", "url", "endpoint", "region"];

const LIMIT_KEYS: &[&str] = &["limit", "max_results", "maxresults", "head", "top"];

const LENGTH_NORMALIZER: f64 = 10_000.0;
const ROW_NORMALIZER: f64 = 1e9;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicFeatureExtractor;

/// Lowercased string leaves joined by spaces, plus every key seen.
fn collect(value: &Value, text: &mut String, keys: &mut Vec<String>, numbers: &mut Vec<(String, f64)>, parent: &str) {
    match value {
        Value::Object(map) => {
            for (key, member) in map {
                let key = key.to_lowercase();
                collect(member, text, keys, numbers, &key);
                keys.push(key);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, text, keys, numbers, parent);
            }
        }
        Value::String(s) => {
            text.push(' ');
            text.push_str(&s.to_lowercase());
        }
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                numbers.push((parent.to_string(), n));
            }
        }
        _ => {}
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Count of unbalanced delimiters and unterminated quotes.
fn delimiter_imbalance(text: &str) -> usize {
    let mut stack = Vec::new();
    let mut unmatched = 0usize;
    let mut single_quotes = 0usize;
    let mut double_quotes = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    unmatched += 1;
                }
            }
            '\'' => single_quotes += 1,
            '"' => double_quotes += 1,
            _ => {}
        }
    }
    unmatched + stack.len() + single_quotes % 2 + double_quotes % 2
}

impl FeatureExtractor for HeuristicFeatureExtractor {
    fn extract(&self, _tool: &str, params: &Value) -> FeatureVector {
        let mut text = String::new();
        let mut keys = Vec::new();
        let mut numbers = Vec::new();
        collect(params, &mut text, &mut keys, &mut numbers, "");
        let has_key = |wanted: &[&str]| keys.iter().any(|k| wanted.contains(&k.as_str()));

        let has_limit = text.contains("limit ") || has_key(LIMIT_KEYS);
        let has_join = text.contains(" join ");
        let select_star = text.contains("select *");

        let mut features = [0.0; FEATURE_COUNT];

        let imbalance = delimiter_imbalance(&text);
        let dangling = text.trim_end().ends_with(',') || text.contains(",,");
        features[index::SYNTAX_RISK] = (imbalance as f64 * 0.5 + flag(dangling) * 0.5).min(1.0);

        let mut cost = 0.0f64;
        if select_star && !has_limit {
            cost += 0.6;
        }
        if text.contains("cross join") {
            cost += 0.4;
        }
        if text.contains("order by") && !has_limit {
            cost += 0.2;
        }
        if has_join && !text.contains(" where ") {
            cost += 0.2;
        }
        features[index::COST_RISK] = cost.min(1.0);

        let destructive = DESTRUCTIVE_KEYWORDS
            .iter()
            .filter(|k| text.contains(*k))
            .count();
        features[index::PERMISSION_RISK] = (destructive as f64 * 0.5).min(1.0);

        let summary = summarize(params);
        features[index::COMPLEXITY] =
            ((summary.depth as f64 / 5.0) * 0.5 + (summary.key_count as f64 / 20.0) * 0.5).min(1.0);

        features[index::CROSS_BOUNDARY] = flag(text.contains("://") || has_key(BOUNDARY_KEYS));
        features[index::HAS_JOIN] = flag(has_join);
        features[index::HAS_WILDCARD] = flag(text.contains('*') || text.contains('%'));
        features[index::HAS_LIMIT] = flag(has_limit);

        let rows = numbers
            .iter()
            .filter(|(key, _)| ROW_KEYS.contains(&key.as_str()))
            .map(|(_, n)| n.abs())
            .filter(|n| n.is_finite())
            .fold(0.0f64, f64::max);
        features[index::ESTIMATED_ROWS] = ((1.0 + rows).ln() / (1.0 + ROW_NORMALIZER).ln()).min(1.0);

        features[index::INPUT_LENGTH] = (summary.payload_bytes as f64 / LENGTH_NORMALIZER).min(1.0);

        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(params: Value) -> FeatureVector {
        HeuristicFeatureExtractor.extract("query-exec", &params)
    }

    #[test]
    fn test_unbounded_select_star_is_costly() {
        let f = extract(json!({ "query": "SELECT * FROM events" }));
        assert!(f[index::COST_RISK] >= 0.6);
        assert_eq!(f[index::HAS_WILDCARD], 1.0);
        assert_eq!(f[index::HAS_LIMIT], 0.0);

        let bounded = extract(json!({ "query": "SELECT * FROM events LIMIT 10" }));
        assert!(bounded[index::COST_RISK] < f[index::COST_RISK]);
        assert_eq!(bounded[index::HAS_LIMIT], 1.0);
    }

    #[test]
    fn test_cost_risk_saturates_at_one() {
        let f = extract(json!({ "query": "select * from a cross join b order by a.id" }));
        assert_eq!(f[index::COST_RISK], 1.0);
        assert_eq!(extract(json!({ "query": "select id from a limit 5" }))[index::COST_RISK], 0.0);
    }

    #[test]
    fn test_unbalanced_parentheses_raise_syntax_risk() {
        let f = extract(json!({ "query": "SELECT count(id FROM t" }));
        assert!(f[index::SYNTAX_RISK] >= 0.5);
        assert_eq!(extract(json!({ "query": "SELECT count(id) FROM t" }))[index::SYNTAX_RISK], 0.0);
    }

    #[test]
    fn test_destructive_commands_raise_permission_risk() {
        let f = extract(json!({ "command": "git push --force origin main" }));
        assert!(f[index::PERMISSION_RISK] > 0.0);
        assert_eq!(extract(json!({ "command": "git status" }))[index::PERMISSION_RISK], 0.0);
    }

    #[test]
    fn test_join_boundary_and_rows() {
        let f = extract(json!({
            "query": "select a.id from a join b on a.id = b.id",
            "project": "analytics",
            "max_results": 1000
        }));
        assert_eq!(f[index::HAS_JOIN], 1.0);
        assert_eq!(f[index::CROSS_BOUNDARY], 1.0);
        assert!(f[index::ESTIMATED_ROWS] > 0.0 && f[index::ESTIMATED_ROWS] < 1.0);
    }

    #[test]
    fn test_features_stay_in_unit_interval() {
        let huge = "x".repeat(50_000);
        for params in [json!({}), json!(null), json!({ "q": huge, "rows": 1e300 }), json!([1, "((("])] {
            let f = extract(params);
            assert!(f.iter().all(|v| v.is_finite() && (0.0..=1.0).contains(v)), "{f:?}");
        }
    }
}
