// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pool sizing configuration and the statistics snapshot reported by the coordinator.

use crate::domain::capability::Capability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Idle workers kept per capability.
    pub pool_size_per_capability: usize,
    /// Global cap on concurrently solving workers, across all capabilities.
    pub max_concurrent_workers: usize,
    /// Upper bound on a single task, applied on top of the dispatch deadline.
    #[serde(with = "humantime_serde")]
    pub worker_deadline: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size_per_capability: 3,
            max_concurrent_workers: 10,
            worker_deadline: Duration::from_millis(40),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_workers == 0 {
            return Err("pool.max_concurrent_workers must be at least 1".to_string());
        }
        if self.worker_deadline.is_zero() {
            return Err("pool.worker_deadline must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Point-in-time counters for a [`crate::WorkerPoolCoordinator`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active: usize,
    pub peak_active: usize,
    pub spawned: u64,
    pub reused: u64,
    pub completed: u64,
    pub failed: u64,
    pub expired: u64,
    pub destroyed: u64,
    pub capacity_rejections: u64,
    pub idle: BTreeMap<Capability, usize>,
}
