// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! [`TaskHandler`] is the seam between the pool and whatever actually performs
//! the analysis. The coordinator knows nothing about the task payload; it only
//! owns worker lifecycle, concurrency and deadlines.

pub mod coordinator;

pub use coordinator::WorkerPoolCoordinator;

use crate::domain::Capability;
use anyhow::Result;
use async_trait::async_trait;

/// Executes one task on behalf of a worker of the given capability.
///
/// Implementations must only perform bounded work. A handler that outlives the
/// worker deadline is cancelled and its result discarded.
#[async_trait]
pub trait TaskHandler<T, O>: Send + Sync
where
    T: Send + Sync,
    O: Send,
{
    async fn run(&self, capability: Capability, task: &T) -> Result<O>;
}
