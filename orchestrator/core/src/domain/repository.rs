// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Store Interface
//!
//! Persistence contract for command patterns and learned patterns, defined in
//! the domain layer and implemented in `crate::infrastructure::repositories`.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | `InMemoryPatternStore` | process memory (development, tests) |
//! | `SqlitePatternStore` | SQLite via a pooled `sqlx` connection (WAL) |
//!
//! The backend is selected at startup from `storage.backend` in
//! `augur-config.yaml`.

use crate::domain::pattern::{
    CommandPattern, LearnedPattern, NewCommandPattern, PatternAggregate, PatternType, StoreStats,
};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Newest records per tool a similarity lookup examines by default.
pub const DEFAULT_SIMILAR_SCAN: usize = 256;

#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Append one immutable record and return its id.
    async fn record(&self, pattern: NewCommandPattern) -> Result<Uuid, StoreError>;

    /// Records for `tool` whose structural similarity to `params` clears
    /// `SIMILARITY_FLOOR`, newest first (ties by id desc). Only the store's
    /// scan window of newest records for the tool is examined.
    async fn similar(&self, tool: &str, params: &Value, limit: usize)
        -> Result<Vec<CommandPattern>, StoreError>;

    async fn aggregate(&self, tool: &str) -> Result<PatternAggregate, StoreError>;

    /// Aggregate over records whose hour is within `hour_window` of
    /// `hour_of_day` on the 24-hour clock and whose day of week matches.
    async fn time_correlated(
        &self,
        tool: &str,
        hour_of_day: u8,
        day_of_week: u8,
        hour_window: u8,
    ) -> Result<PatternAggregate, StoreError>;

    /// Newest records for `tool`, regardless of parameters.
    async fn recent(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError>;

    /// Newest successful records for `tool`.
    async fn successful(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError>;

    async fn learned(&self, pattern_id: Uuid) -> Result<Option<LearnedPattern>, StoreError>;

    async fn upsert_learned(&self, pattern: &LearnedPattern) -> Result<(), StoreError>;

    /// Learned patterns of one type, confidence desc then last seen desc.
    async fn learned_patterns(
        &self,
        pattern_type: PatternType,
        limit: usize,
    ) -> Result<Vec<LearnedPattern>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Circular distance between two hours on the 24-hour clock.
pub fn hour_distance(a: u8, b: u8) -> u8 {
    let d = (i16::from(a) - i16::from(b)).rem_euclid(24) as u8;
    d.min(24 - d)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Pattern store unavailable: {0}")]
    Unavailable(String),

    #[error("Pattern store query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying the same operation later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
