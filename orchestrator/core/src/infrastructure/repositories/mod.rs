// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern Store Implementations
//!
//! Infrastructure implementations of [`PatternStore`].
//!
//! - **SqlitePatternStore** - durable store on a pooled SQLite connection
//! - **InMemoryPatternStore** - lock-protected vectors for development and tests
//!
//! Both honour the same ordering and aggregation rules; the shared helpers
//! live in `crate::domain::pattern`.

pub mod sqlite_pattern;

pub use sqlite_pattern::SqlitePatternStore;

use crate::domain::pattern::{
    most_confident_first, newest_first, CommandPattern, LearnedPattern, NewCommandPattern,
    Outcome, PatternAggregate, PatternType, StoreStats,
};
use crate::domain::repository::{hour_distance, PatternStore, StoreError, DEFAULT_SIMILAR_SCAN};
use crate::domain::similarity::{structural_similarity, SIMILARITY_FLOOR};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryPatternStore {
    records: Arc<RwLock<Vec<CommandPattern>>>,
    learned: Arc<RwLock<HashMap<Uuid, LearnedPattern>>>,
    scan_limit: usize,
}

impl Default for InMemoryPatternStore {
    fn default() -> Self {
        Self {
            records: Arc::default(),
            learned: Arc::default(),
            scan_limit: DEFAULT_SIMILAR_SCAN,
        }
    }
}

impl InMemoryPatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps how many of a tool's newest records `similar` compares.
    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit.max(1);
        self
    }

    fn newest<F>(&self, limit: usize, keep: F) -> Vec<CommandPattern>
    where
        F: Fn(&CommandPattern) -> bool,
    {
        let records = self.records.read();
        let mut matching: Vec<&CommandPattern> = records.iter().filter(|p| keep(p)).collect();
        matching.sort_by(|a, b| newest_first(a, b));
        matching.into_iter().take(limit).cloned().collect()
    }
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn record(&self, pattern: NewCommandPattern) -> Result<Uuid, StoreError> {
        let pattern = pattern.into_pattern();
        let id = pattern.id;
        self.records.write().push(pattern);
        Ok(id)
    }

    async fn similar(
        &self,
        tool: &str,
        params: &Value,
        limit: usize,
    ) -> Result<Vec<CommandPattern>, StoreError> {
        Ok(self
            .newest(self.scan_limit, |p| p.tool == tool)
            .into_iter()
            .filter(|p| structural_similarity(params, &p.params) >= SIMILARITY_FLOOR)
            .take(limit)
            .collect())
    }

    async fn aggregate(&self, tool: &str) -> Result<PatternAggregate, StoreError> {
        let records = self.records.read();
        Ok(PatternAggregate::from_patterns(
            records.iter().filter(|p| p.tool == tool),
        ))
    }

    async fn time_correlated(
        &self,
        tool: &str,
        hour_of_day: u8,
        day_of_week: u8,
        hour_window: u8,
    ) -> Result<PatternAggregate, StoreError> {
        let records = self.records.read();
        Ok(PatternAggregate::from_patterns(records.iter().filter(|p| {
            p.tool == tool
                && p.day_of_week == day_of_week
                && hour_distance(p.hour_of_day, hour_of_day) <= hour_window
        })))
    }

    async fn recent(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
        Ok(self.newest(limit, |p| p.tool == tool))
    }

    async fn successful(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
        Ok(self.newest(limit, |p| p.tool == tool && p.outcome == Outcome::Success))
    }

    async fn learned(&self, pattern_id: Uuid) -> Result<Option<LearnedPattern>, StoreError> {
        Ok(self.learned.read().get(&pattern_id).cloned())
    }

    async fn upsert_learned(&self, pattern: &LearnedPattern) -> Result<(), StoreError> {
        self.learned
            .write()
            .insert(pattern.pattern_id, pattern.clone());
        Ok(())
    }

    async fn learned_patterns(
        &self,
        pattern_type: PatternType,
        limit: usize,
    ) -> Result<Vec<LearnedPattern>, StoreError> {
        let learned = self.learned.read();
        let mut patterns: Vec<LearnedPattern> = learned
            .values()
            .filter(|p| p.pattern_type == pattern_type)
            .cloned()
            .collect();
        patterns.sort_by(most_confident_first);
        patterns.truncate(limit);
        Ok(patterns)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            total_records: self.records.read().len() as u64,
            learned_patterns: self.learned.read().len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::ToolContext;
    use serde_json::json;

    // Monday 2024-01-01 10:00 UTC
    const MONDAY_10: i64 = 1_704_103_200_000;
    const HOUR_MS: i64 = 3_600_000;

    fn new_pattern(tool: &str, params: Value, outcome: Outcome, timestamp_ms: i64) -> NewCommandPattern {
        NewCommandPattern {
            tool: tool.to_string(),
            params,
            context: ToolContext::default(),
            outcome,
            duration_ms: 40,
            error: (outcome == Outcome::Failure).then(|| "timeout".to_string()),
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn test_empty_store_aggregates_to_zero() {
        let store = InMemoryPatternStore::new();
        let aggregate = store.aggregate("query-exec").await.unwrap();
        assert_eq!(aggregate.total, 0);
        assert_eq!(aggregate.success_rate(), 0.0);
        assert!(store.similar("query-exec", &json!({}), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_similar_filters_by_floor_and_orders_newest_first() {
        let store = InMemoryPatternStore::new();
        let params = json!({ "query": "SELECT 1", "dataset": "prod" });
        let older = store
            .record(new_pattern("query-exec", params.clone(), Outcome::Success, MONDAY_10))
            .await
            .unwrap();
        let newer = store
            .record(new_pattern("query-exec", params.clone(), Outcome::Failure, MONDAY_10 + 1_000))
            .await
            .unwrap();
        store
            .record(new_pattern("query-exec", json!({ "branch": "main" }), Outcome::Success, MONDAY_10 + 2_000))
            .await
            .unwrap();
        store
            .record(new_pattern("vcs-commit", params.clone(), Outcome::Success, MONDAY_10))
            .await
            .unwrap();

        let similar = store.similar("query-exec", &params, 10).await.unwrap();
        let ids: Vec<Uuid> = similar.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![newer, older]);

        let limited = store.similar("query-exec", &params, 1).await.unwrap();
        assert_eq!(limited[0].id, newer);
    }

    #[tokio::test]
    async fn test_similar_scan_window_skips_older_records() {
        let store = InMemoryPatternStore::new().with_scan_limit(2);
        let params = json!({ "query": "SELECT 1", "dataset": "prod" });
        store
            .record(new_pattern("query-exec", params.clone(), Outcome::Success, MONDAY_10))
            .await
            .unwrap();
        let recent = store
            .record(new_pattern("query-exec", params.clone(), Outcome::Failure, MONDAY_10 + 2_000))
            .await
            .unwrap();
        store
            .record(new_pattern("query-exec", json!({ "branch": "main" }), Outcome::Success, MONDAY_10 + 1_000))
            .await
            .unwrap();
        // Other tools do not consume the window.
        store
            .record(new_pattern("vcs-commit", params.clone(), Outcome::Success, MONDAY_10 + 5_000))
            .await
            .unwrap();

        let similar = store.similar("query-exec", &params, 10).await.unwrap();
        assert_eq!(similar.iter().map(|p| p.id).collect::<Vec<_>>(), vec![recent]);
    }

    #[tokio::test]
    async fn test_time_correlation_wraps_and_matches_weekday() {
        let store = InMemoryPatternStore::new();
        for offset in [0, 1, 3] {
            store
                .record(new_pattern("query-exec", json!({}), Outcome::Success, MONDAY_10 + offset * HOUR_MS))
                .await
                .unwrap();
        }
        // Tuesday, same hour
        store
            .record(new_pattern("query-exec", json!({}), Outcome::Failure, MONDAY_10 + 24 * HOUR_MS))
            .await
            .unwrap();

        let window = store.time_correlated("query-exec", 10, 1, 1).await.unwrap();
        assert_eq!(window.total, 2);
        assert_eq!(window.success_rate(), 1.0);

        let tuesday = store.time_correlated("query-exec", 10, 2, 0).await.unwrap();
        assert_eq!(tuesday.total, 1);
        assert_eq!(tuesday.top_errors[0].error, "timeout");
    }

    #[tokio::test]
    async fn test_successful_and_learned_queries() {
        let store = InMemoryPatternStore::new();
        store
            .record(new_pattern("git", json!({ "cmd": "status" }), Outcome::Failure, MONDAY_10))
            .await
            .unwrap();
        let ok = store
            .record(new_pattern("git", json!({ "cmd": "status" }), Outcome::Success, MONDAY_10))
            .await
            .unwrap();
        let successful = store.successful("git", 5).await.unwrap();
        assert_eq!(successful.len(), 1);
        assert_eq!(successful[0].id, ok);

        let cp = store.recent("git", 1).await.unwrap().remove(0);
        let learned = LearnedPattern::fold_outcome(None, &cp, 10.0);
        store.upsert_learned(&learned).await.unwrap();
        store
            .upsert_learned(&LearnedPattern::fold_outcome(Some(learned.clone()), &cp, 10.0))
            .await
            .unwrap();

        let fetched = store.learned(learned.pattern_id).await.unwrap().unwrap();
        assert_eq!(fetched.occurrence_count, 2);
        let listed = store
            .learned_patterns(learned.pattern_type, 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                total_records: 2,
                learned_patterns: 1
            }
        );
    }
}
