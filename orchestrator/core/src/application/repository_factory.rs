// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates the concrete [`PatternStore`] for the configured storage backend,
//! keeping the domain layer free of infrastructure types.

use std::sync::Arc;

use anyhow::Result;

use crate::domain::config::{StorageBackend, StorageConfig};
use crate::domain::repository::PatternStore;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{InMemoryPatternStore, SqlitePatternStore};

/// The store plus the pool backing it, if any, so callers can close it on shutdown.
pub struct PatternStoreHandle {
    pub store: Arc<dyn PatternStore>,
    pub database: Option<Database>,
}

/// Creates a PatternStore implementation based on the configured backend
pub async fn create_pattern_store(config: &StorageConfig) -> Result<PatternStoreHandle> {
    match config.backend {
        StorageBackend::InMemory => {
            tracing::info!("Using in-memory pattern store");
            Ok(PatternStoreHandle {
                store: Arc::new(InMemoryPatternStore::new().with_scan_limit(config.similar_scan_limit)),
                database: None,
            })
        }
        StorageBackend::Sqlite => {
            let database = Database::connect(config).await?;
            Ok(PatternStoreHandle {
                store: Arc::new(SqlitePatternStore::new(&database).with_scan_limit(config.similar_scan_limit)),
                database: Some(database),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_backend_has_no_pool() {
        let handle = create_pattern_store(&StorageConfig::default()).await.unwrap();
        assert!(handle.database.is_none());
        assert_eq!(handle.store.stats().await.unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn test_sqlite_backend_opens_pool() {
        let config = StorageConfig {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite::memory:".to_string(),
            ..StorageConfig::default()
        };
        let handle = create_pattern_store(&config).await.unwrap();
        assert!(handle.database.is_some());
        assert_eq!(handle.store.stats().await.unwrap().learned_patterns, 0);
    }
}
