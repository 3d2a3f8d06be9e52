// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Pattern Store
//!
//! Durable `PatternStore` backed by the `command_patterns` and
//! `learned_patterns` tables (see `migrations/001_patterns.sql`). Ids are
//! stored as hyphenated text, parameters and context as JSON text.
//!
//! Counting and grouping run in SQL. Structural similarity runs in Rust over
//! the tool's newest `scan_limit` rows, since it has no SQL equivalent.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::pattern::{
    sort_top_errors, CommandPattern, ErrorFrequency, LearnedPattern, NewCommandPattern,
    PatternAggregate, PatternType, StoreStats, TOP_ERRORS,
};
use crate::domain::repository::{hour_distance, PatternStore, StoreError, DEFAULT_SIMILAR_SCAN};
use crate::domain::similarity::{structural_similarity, SIMILARITY_FLOOR};
use crate::infrastructure::db::Database;

const PATTERN_COLUMNS: &str = "id, tool, params, params_hash, context, outcome, duration_ms, \
                               error, timestamp, hour_of_day, day_of_week";

pub struct SqlitePatternStore {
    pool: SqlitePool,
    scan_limit: usize,
}

impl SqlitePatternStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.get_pool().clone(),
            scan_limit: DEFAULT_SIMILAR_SCAN,
        }
    }

    /// Caps how many of a tool's newest rows `similar` compares.
    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit.max(1);
        self
    }

    /// Aggregate over `tool` rows matching an extra SQL predicate. The
    /// predicate must contain only literals.
    async fn aggregate_where(&self, tool: &str, predicate: &str) -> Result<PatternAggregate, StoreError> {
        let totals = sqlx::query(&format!(
            "SELECT COUNT(*) AS total, \
                    COALESCE(SUM(CASE WHEN outcome = 'success' THEN 1 ELSE 0 END), 0) AS successes, \
                    AVG(duration_ms) AS avg_duration \
             FROM command_patterns WHERE tool = ?1 {predicate}"
        ))
        .bind(tool)
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = totals.try_get("total")?;
        let successes: i64 = totals.try_get("successes")?;
        let avg_duration_ms: Option<f64> = totals.try_get("avg_duration")?;

        let error_rows = sqlx::query(&format!(
            "SELECT error, COUNT(*) AS count FROM command_patterns \
             WHERE tool = ?1 AND outcome = 'failure' AND error IS NOT NULL {predicate} \
             GROUP BY error ORDER BY count DESC, error ASC LIMIT ?2"
        ))
        .bind(tool)
        .bind(TOP_ERRORS as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut top_errors = error_rows
            .iter()
            .map(|row| {
                Ok(ErrorFrequency {
                    error: row.try_get("error")?,
                    count: row.try_get::<i64, _>("count")?.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        // SQLite's text collation is bytewise, same as Rust; sort anyway so
        // both backends share one definition.
        sort_top_errors(&mut top_errors);

        Ok(PatternAggregate {
            total: total.max(0) as u64,
            successes: successes.max(0) as u64,
            avg_duration_ms,
            top_errors,
        })
    }

    async fn newest(&self, tool: &str, predicate: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PATTERN_COLUMNS} FROM command_patterns WHERE tool = ?1 {predicate} \
             ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))
        .bind(tool)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pattern_from_row).collect()
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Serialization(format!("invalid id '{raw}': {e}")))
}

fn pattern_from_row(row: &SqliteRow) -> Result<CommandPattern, StoreError> {
    let id: String = row.try_get("id")?;
    let params: String = row.try_get("params")?;
    let context: String = row.try_get("context")?;
    let outcome: String = row.try_get("outcome")?;

    Ok(CommandPattern {
        id: parse_uuid(&id)?,
        tool: row.try_get("tool")?,
        params: serde_json::from_str(&params)?,
        params_hash: row.try_get("params_hash")?,
        context: serde_json::from_str(&context)?,
        outcome: outcome.parse().map_err(StoreError::Serialization)?,
        duration_ms: row.try_get::<i64, _>("duration_ms")?.max(0) as u64,
        error: row.try_get("error")?,
        timestamp_ms: row.try_get("timestamp")?,
        hour_of_day: row.try_get::<i64, _>("hour_of_day")? as u8,
        day_of_week: row.try_get::<i64, _>("day_of_week")? as u8,
    })
}

fn learned_from_row(row: &SqliteRow) -> Result<LearnedPattern, StoreError> {
    let pattern_id: String = row.try_get("pattern_id")?;
    let pattern_type: String = row.try_get("pattern_type")?;
    let payload: String = row.try_get("payload")?;

    Ok(LearnedPattern {
        pattern_id: parse_uuid(&pattern_id)?,
        pattern_type: pattern_type.parse().map_err(StoreError::Serialization)?,
        payload: serde_json::from_str(&payload)?,
        confidence: row.try_get("confidence")?,
        occurrence_count: row.try_get::<i64, _>("occurrence_count")?.max(0) as u64,
        last_seen_ms: row.try_get("last_seen")?,
    })
}

#[async_trait]
impl PatternStore for SqlitePatternStore {
    async fn record(&self, pattern: NewCommandPattern) -> Result<Uuid, StoreError> {
        let pattern = pattern.into_pattern();
        let params = serde_json::to_string(&pattern.params)?;
        let context = serde_json::to_string(&pattern.context)?;

        sqlx::query(
            r#"
            INSERT INTO command_patterns (
                id, tool, params, params_hash, context, outcome,
                duration_ms, error, timestamp, hour_of_day, day_of_week
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(pattern.id.to_string())
        .bind(&pattern.tool)
        .bind(params)
        .bind(&pattern.params_hash)
        .bind(context)
        .bind(pattern.outcome.as_str())
        .bind(pattern.duration_ms as i64)
        .bind(&pattern.error)
        .bind(pattern.timestamp_ms)
        .bind(i64::from(pattern.hour_of_day))
        .bind(i64::from(pattern.day_of_week))
        .execute(&self.pool)
        .await?;

        Ok(pattern.id)
    }

    async fn similar(
        &self,
        tool: &str,
        params: &Value,
        limit: usize,
    ) -> Result<Vec<CommandPattern>, StoreError> {
        let candidates = self.newest(tool, "", self.scan_limit).await?;
        Ok(candidates
            .into_iter()
            .filter(|p| structural_similarity(params, &p.params) >= SIMILARITY_FLOOR)
            .take(limit)
            .collect())
    }

    async fn aggregate(&self, tool: &str) -> Result<PatternAggregate, StoreError> {
        self.aggregate_where(tool, "").await
    }

    async fn time_correlated(
        &self,
        tool: &str,
        hour_of_day: u8,
        day_of_week: u8,
        hour_window: u8,
    ) -> Result<PatternAggregate, StoreError> {
        let hours: Vec<String> = (0u8..24)
            .filter(|h| hour_distance(*h, hour_of_day) <= hour_window)
            .map(|h| h.to_string())
            .collect();
        let predicate = format!(
            "AND day_of_week = {} AND hour_of_day IN ({})",
            day_of_week,
            hours.join(", ")
        );
        self.aggregate_where(tool, &predicate).await
    }

    async fn recent(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
        self.newest(tool, "", limit).await
    }

    async fn successful(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
        self.newest(tool, "AND outcome = 'success'", limit).await
    }

    async fn learned(&self, pattern_id: Uuid) -> Result<Option<LearnedPattern>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT pattern_id, pattern_type, payload, confidence, occurrence_count, last_seen
            FROM learned_patterns
            WHERE pattern_id = ?1
            "#,
        )
        .bind(pattern_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(learned_from_row).transpose()
    }

    async fn upsert_learned(&self, pattern: &LearnedPattern) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&pattern.payload)?;

        sqlx::query(
            r#"
            INSERT INTO learned_patterns (
                pattern_id, pattern_type, payload, confidence, occurrence_count, last_seen
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (pattern_id) DO UPDATE SET
                payload = excluded.payload,
                confidence = excluded.confidence,
                occurrence_count = excluded.occurrence_count,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(pattern.pattern_id.to_string())
        .bind(pattern.pattern_type.as_str())
        .bind(payload)
        .bind(pattern.confidence)
        .bind(pattern.occurrence_count as i64)
        .bind(pattern.last_seen_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn learned_patterns(
        &self,
        pattern_type: PatternType,
        limit: usize,
    ) -> Result<Vec<LearnedPattern>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT pattern_id, pattern_type, payload, confidence, occurrence_count, last_seen
            FROM learned_patterns
            WHERE pattern_type = ?1
            ORDER BY confidence DESC, last_seen DESC
            LIMIT ?2
            "#,
        )
        .bind(pattern_type.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(learned_from_row).collect()
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM command_patterns) AS total_records,
                (SELECT COUNT(*) FROM learned_patterns) AS learned_patterns
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_records: row.try_get::<i64, _>("total_records")?.max(0) as u64,
            learned_patterns: row.try_get::<i64, _>("learned_patterns")?.max(0) as u64,
        })
    }
}
