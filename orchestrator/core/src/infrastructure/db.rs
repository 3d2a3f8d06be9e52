// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SQLite Connection Pool
//!
//! Wraps `sqlx::sqlite::SqlitePool` in a thin `Database` newtype that is
//! injected into the SQLite pattern store. File databases run in WAL mode so
//! readers never block the single learning writer.

use crate::domain::config::StorageConfig;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

const MIGRATIONS: &str = include_str!("../../migrations/001_patterns.sql");

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let url = config.database_url.as_str();
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database url '{url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            // Every connection to `:memory:` is a separate database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database '{url}'"))?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::info!(url, in_memory, "Pattern database ready");
        Ok(db)
    }

    /// Private in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&StorageConfig {
            database_url: "sqlite::memory:".to_string(),
            ..StorageConfig::default()
        })
        .await
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATIONS)
            .execute(&self.pool)
            .await
            .context("Failed to apply pattern store migrations")?;
        Ok(())
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::in_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(db.get_pool())
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert!(names.contains(&"command_patterns"));
        assert!(names.contains(&"learned_patterns"));
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("patterns.db").display());
        let db = Database::connect(&StorageConfig {
            database_url: url,
            ..StorageConfig::default()
        })
        .await
        .unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(db.get_pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await;
    }
}
