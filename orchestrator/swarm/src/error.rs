// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::{Capability, WorkerState};
use thiserror::Error;

/// Errors that can occur while dispatching work to the pool.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// The global concurrency budget stayed exhausted until the dispatch deadline.
    #[error("Worker capacity exhausted for {capability} ({max_concurrent} concurrent workers)")]
    CapacityExceeded {
        capability: Capability,
        max_concurrent: usize,
    },

    #[error("Worker for {capability} expired after {elapsed_ms}ms")]
    WorkerExpired {
        capability: Capability,
        elapsed_ms: u64,
    },

    #[error("Worker for {capability} failed: {reason}")]
    WorkerFailed {
        capability: Capability,
        reason: String,
    },

    #[error("Invalid worker transition from {from:?} to {to:?}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
}
