// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Patterns
//!
//! [`CommandPattern`] is the immutable record of one observed tool invocation.
//! [`LearnedPattern`] is a mutable aggregate folded from many command patterns
//! and upserted under a deterministic id, so re-folding the same key updates
//! rather than duplicates.

use crate::domain::context::ToolContext;
use crate::domain::similarity::params_hash;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Occurrences needed before a pattern is considered fully established.
pub const DEFAULT_CONFIDENCE_SATURATION: f64 = 10.0;

/// Maximum number of distinct errors reported by an aggregate.
pub const TOP_ERRORS: usize = 5;

/// Namespace for deterministic learned pattern ids.
const LEARNED_PATTERN_NAMESPACE: Uuid = Uuid::from_u128(0x5b0f_8c3e_7d41_4a6e_9f12_c4d8_a7e3_b901);

/// `min(1, occurrences / saturation)`. Monotonic non-decreasing in
/// `occurrences`, saturating at 1.0.
pub fn confidence(occurrences: u64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return if occurrences > 0 { 1.0 } else { 0.0 };
    }
    (occurrences as f64 / saturation).min(1.0)
}

/// UTC hour of day `[0, 23]` and ISO day of week `[1, 7]` (Monday = 1).
pub fn hour_and_weekday(timestamp_ms: i64) -> (u8, u8) {
    let at = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default();
    (at.hour() as u8, at.weekday().number_from_monday() as u8)
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Immutable record of one tool invocation and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPattern {
    pub id: Uuid,
    pub tool: String,
    pub params: Value,
    /// Hex SHA-256 of the canonical JSON encoding of `params`.
    pub params_hash: String,
    pub context: ToolContext,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp_ms: i64,
    pub hour_of_day: u8,
    pub day_of_week: u8,
}

/// Input to [`crate::domain::repository::PatternStore::record`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewCommandPattern {
    pub tool: String,
    pub params: Value,
    pub context: ToolContext,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub timestamp_ms: i64,
}

impl NewCommandPattern {
    /// Assign an id and derive the hash and calendar fields.
    pub fn into_pattern(self) -> CommandPattern {
        let (hour_of_day, day_of_week) = hour_and_weekday(self.timestamp_ms);
        CommandPattern {
            id: Uuid::new_v4(),
            params_hash: params_hash(&self.params),
            tool: self.tool,
            params: self.params,
            context: self.context,
            outcome: self.outcome,
            duration_ms: self.duration_ms,
            error: self.error,
            timestamp_ms: self.timestamp_ms,
            hour_of_day,
            day_of_week,
        }
    }
}

/// Newest first, ties broken by id descending.
pub fn newest_first(a: &CommandPattern, b: &CommandPattern) -> std::cmp::Ordering {
    b.timestamp_ms
        .cmp(&a.timestamp_ms)
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrequency {
    pub error: String,
    pub count: u64,
}

/// Outcome statistics over a set of command patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAggregate {
    pub total: u64,
    pub successes: u64,
    pub avg_duration_ms: Option<f64>,
    /// Most frequent failure errors, count desc then error asc.
    pub top_errors: Vec<ErrorFrequency>,
}

impl PatternAggregate {
    /// `successes / total`, or 0 when there is no history.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    pub fn failures(&self) -> u64 {
        self.total.saturating_sub(self.successes)
    }

    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a CommandPattern>) -> Self {
        let mut total = 0u64;
        let mut successes = 0u64;
        let mut duration_sum = 0f64;
        let mut errors: std::collections::HashMap<&str, u64> = std::collections::HashMap::new();

        for pattern in patterns {
            total += 1;
            duration_sum += pattern.duration_ms as f64;
            if pattern.outcome.is_success() {
                successes += 1;
            } else if let Some(error) = pattern.error.as_deref() {
                *errors.entry(error).or_default() += 1;
            }
        }

        let mut top_errors: Vec<ErrorFrequency> = errors
            .into_iter()
            .map(|(error, count)| ErrorFrequency {
                error: error.to_string(),
                count,
            })
            .collect();
        sort_top_errors(&mut top_errors);

        Self {
            total,
            successes,
            avg_duration_ms: (total > 0).then(|| duration_sum / total as f64),
            top_errors,
        }
    }
}

/// Sort by count desc, then error asc, and keep the first [`TOP_ERRORS`].
pub fn sort_top_errors(errors: &mut Vec<ErrorFrequency>) {
    errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));
    errors.truncate(TOP_ERRORS);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Sequence,
    Failure,
    Success,
    Timing,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Sequence => "sequence",
            PatternType::Failure => "failure",
            PatternType::Success => "success",
            PatternType::Timing => "timing",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence" => Ok(PatternType::Sequence),
            "failure" => Ok(PatternType::Failure),
            "success" => Ok(PatternType::Success),
            "timing" => Ok(PatternType::Timing),
            other => Err(format!("unknown pattern type '{other}'")),
        }
    }
}

/// Aggregate derived from many command patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    pub pattern_id: Uuid,
    pub pattern_type: PatternType,
    pub payload: Value,
    pub confidence: f64,
    pub occurrence_count: u64,
    pub last_seen_ms: i64,
}

impl LearnedPattern {
    fn key_id(pattern_type: PatternType, key: &str) -> Uuid {
        Uuid::new_v5(
            &LEARNED_PATTERN_NAMESPACE,
            format!("{}:{}", pattern_type.as_str(), key).as_bytes(),
        )
    }

    pub fn outcome_id(tool: &str, params_hash: &str, outcome: Outcome) -> Uuid {
        let pattern_type = match outcome {
            Outcome::Success => PatternType::Success,
            Outcome::Failure => PatternType::Failure,
        };
        Self::key_id(pattern_type, &format!("{tool}\u{1f}{params_hash}"))
    }

    pub fn timing_id(tool: &str, hour_of_day: u8) -> Uuid {
        Self::key_id(PatternType::Timing, &format!("{tool}\u{1f}{hour_of_day}"))
    }

    pub fn sequence_id(from: &str, to: &str) -> Uuid {
        Self::key_id(PatternType::Sequence, &format!("{from}\u{1f}{to}"))
    }

    fn bump(existing: Option<LearnedPattern>, fresh: impl FnOnce() -> LearnedPattern, seen_ms: i64, saturation: f64) -> LearnedPattern {
        let mut pattern = existing.unwrap_or_else(fresh);
        pattern.occurrence_count += 1;
        pattern.confidence = confidence(pattern.occurrence_count, saturation);
        pattern.last_seen_ms = pattern.last_seen_ms.max(seen_ms);
        pattern
    }

    /// Fold `cp` into its success/failure pattern.
    pub fn fold_outcome(existing: Option<LearnedPattern>, cp: &CommandPattern, saturation: f64) -> LearnedPattern {
        let pattern_type = match cp.outcome {
            Outcome::Success => PatternType::Success,
            Outcome::Failure => PatternType::Failure,
        };
        let mut pattern = Self::bump(
            existing,
            || LearnedPattern {
                pattern_id: Self::outcome_id(&cp.tool, &cp.params_hash, cp.outcome),
                pattern_type,
                payload: json!({ "tool": cp.tool, "paramsHash": cp.params_hash }),
                confidence: 0.0,
                occurrence_count: 0,
                last_seen_ms: cp.timestamp_ms,
            },
            cp.timestamp_ms,
            saturation,
        );
        if let (Some(error), Some(payload)) = (cp.error.as_ref(), pattern.payload.as_object_mut()) {
            payload.insert("lastError".to_string(), Value::String(error.clone()));
        }
        pattern
    }

    /// Fold `cp` into the running duration mean for its tool and hour.
    pub fn fold_timing(existing: Option<LearnedPattern>, cp: &CommandPattern, saturation: f64) -> LearnedPattern {
        let mut pattern = Self::bump(
            existing,
            || LearnedPattern {
                pattern_id: Self::timing_id(&cp.tool, cp.hour_of_day),
                pattern_type: PatternType::Timing,
                payload: json!({
                    "tool": cp.tool,
                    "hourOfDay": cp.hour_of_day,
                    "avgDurationMs": 0.0,
                    "samples": 0,
                }),
                confidence: 0.0,
                occurrence_count: 0,
                last_seen_ms: cp.timestamp_ms,
            },
            cp.timestamp_ms,
            saturation,
        );
        if let Some(payload) = pattern.payload.as_object_mut() {
            let samples = payload.get("samples").and_then(Value::as_u64).unwrap_or(0);
            let mean = payload.get("avgDurationMs").and_then(Value::as_f64).unwrap_or(0.0);
            let samples = samples + 1;
            let mean = mean + (cp.duration_ms as f64 - mean) / samples as f64;
            payload.insert("samples".to_string(), json!(samples));
            payload.insert("avgDurationMs".to_string(), json!(mean));
        }
        pattern
    }

    /// Fold `cp` into the `previous tool → tool` transition, if there was a previous tool.
    pub fn fold_sequence(existing: Option<LearnedPattern>, cp: &CommandPattern, saturation: f64) -> Option<LearnedPattern> {
        let from = cp.context.previous_tool()?;
        let mut pattern = Self::bump(
            existing,
            || LearnedPattern {
                pattern_id: Self::sequence_id(from, &cp.tool),
                pattern_type: PatternType::Sequence,
                payload: json!({ "from": from, "to": cp.tool, "successes": 0, "failures": 0 }),
                confidence: 0.0,
                occurrence_count: 0,
                last_seen_ms: cp.timestamp_ms,
            },
            cp.timestamp_ms,
            saturation,
        );
        let field = if cp.outcome.is_success() { "successes" } else { "failures" };
        if let Some(payload) = pattern.payload.as_object_mut() {
            let count = payload.get(field).and_then(Value::as_u64).unwrap_or(0);
            payload.insert(field.to_string(), json!(count + 1));
        }
        Some(pattern)
    }

    /// Success share of a sequence pattern, if it has any observations.
    pub fn sequence_success_rate(&self) -> Option<f64> {
        let successes = self.payload.get("successes").and_then(Value::as_u64)?;
        let failures = self.payload.get("failures").and_then(Value::as_u64)?;
        let total = successes + failures;
        (total > 0).then(|| successes as f64 / total as f64)
    }
}

/// Ordering for learned pattern listings: confidence desc, then last seen desc.
pub fn most_confident_first(a: &LearnedPattern, b: &LearnedPattern) -> std::cmp::Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.last_seen_ms.cmp(&a.last_seen_ms))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_records: u64,
    pub learned_patterns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pattern(outcome: Outcome, error: Option<&str>, duration_ms: u64) -> CommandPattern {
        NewCommandPattern {
            tool: "query-exec".to_string(),
            params: json!({ "query": "SELECT 1" }),
            context: ToolContext {
                recent_tools: vec!["schema-read".to_string()],
                ..ToolContext::default()
            },
            outcome,
            duration_ms,
            error: error.map(str::to_string),
            // Monday 2024-01-01 10:00:00 UTC
            timestamp_ms: 1_704_103_200_000,
        }
        .into_pattern()
    }

    #[test]
    fn test_confidence_saturates() {
        assert_eq!(confidence(0, 10.0), 0.0);
        assert_eq!(confidence(5, 10.0), 0.5);
        assert_eq!(confidence(10, 10.0), 1.0);
        assert_eq!(confidence(1_000, 10.0), 1.0);
    }

    #[test]
    fn test_calendar_fields_are_utc() {
        let cp = pattern(Outcome::Success, None, 10);
        assert_eq!(cp.hour_of_day, 10);
        assert_eq!(cp.day_of_week, 1);
    }

    #[test]
    fn test_empty_aggregate_is_neutral() {
        let aggregate = PatternAggregate::from_patterns(std::iter::empty());
        assert_eq!(aggregate.total, 0);
        assert_eq!(aggregate.success_rate(), 0.0);
        assert!(aggregate.avg_duration_ms.is_none());
    }

    #[test]
    fn test_aggregate_ranks_errors() {
        let patterns = vec![
            pattern(Outcome::Failure, Some("timeout"), 100),
            pattern(Outcome::Failure, Some("timeout"), 100),
            pattern(Outcome::Failure, Some("permission denied"), 100),
            pattern(Outcome::Failure, Some("auth expired"), 100),
            pattern(Outcome::Success, None, 200),
        ];
        let aggregate = PatternAggregate::from_patterns(&patterns);

        assert_eq!(aggregate.total, 5);
        assert_eq!(aggregate.successes, 1);
        assert_eq!(aggregate.avg_duration_ms, Some(120.0));
        assert_eq!(aggregate.top_errors[0].error, "timeout");
        assert_eq!(aggregate.top_errors[1].error, "auth expired");
        assert_eq!(aggregate.top_errors[2].error, "permission denied");
    }

    #[test]
    fn test_learned_ids_are_deterministic() {
        let a = LearnedPattern::outcome_id("git", "abc", Outcome::Failure);
        let b = LearnedPattern::outcome_id("git", "abc", Outcome::Failure);
        let c = LearnedPattern::outcome_id("git", "abc", Outcome::Success);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(
            LearnedPattern::sequence_id("a", "b"),
            LearnedPattern::sequence_id("b", "a")
        );
    }

    #[test]
    fn test_fold_outcome_accumulates() {
        let cp = pattern(Outcome::Failure, Some("timeout"), 50);
        let first = LearnedPattern::fold_outcome(None, &cp, 10.0);
        let second = LearnedPattern::fold_outcome(Some(first.clone()), &cp, 10.0);

        assert_eq!(first.pattern_type, PatternType::Failure);
        assert_eq!(second.pattern_id, first.pattern_id);
        assert_eq!(second.occurrence_count, 2);
        assert!((second.confidence - 0.2).abs() < 1e-12);
        assert_eq!(second.payload["lastError"], "timeout");
    }

    #[test]
    fn test_fold_timing_keeps_running_mean() {
        let first = LearnedPattern::fold_timing(None, &pattern(Outcome::Success, None, 100), 10.0);
        let second =
            LearnedPattern::fold_timing(Some(first), &pattern(Outcome::Success, None, 300), 10.0);
        assert_eq!(second.payload["samples"], 2);
        assert_eq!(second.payload["avgDurationMs"], 200.0);
    }

    #[test]
    fn test_fold_sequence_requires_previous_tool() {
        let mut cp = pattern(Outcome::Failure, Some("timeout"), 10);
        let folded = LearnedPattern::fold_sequence(None, &cp, 10.0).unwrap();
        assert_eq!(folded.payload["from"], "schema-read");
        assert_eq!(folded.sequence_success_rate(), Some(0.0));

        cp.context.recent_tools.clear();
        assert!(LearnedPattern::fold_sequence(None, &cp, 10.0).is_none());
    }

    proptest! {
        #[test]
        fn prop_confidence_monotonic_and_bounded(a in 0u64..10_000, b in 0u64..10_000, saturation in 0.5f64..500.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let c_lo = confidence(lo, saturation);
            let c_hi = confidence(hi, saturation);
            prop_assert!(c_lo <= c_hi);
            prop_assert!((0.0..=1.0).contains(&c_lo));
            prop_assert!((0.0..=1.0).contains(&c_hi));
        }
    }
}
