// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ephemeral Worker Aggregate
//!
//! ```text
//! Spawning → Active → Solving → { Completed | Failed | Expired } → Dissolving
//!                                                                   │
//!                      Completed: reset() → Active (back to pool) ◄─┤
//!                      Failed / Expired: destroyed                ◄─┘
//! ```
//!
//! A worker runs exactly one task per activation and keeps nothing across
//! tasks except its identity.

use crate::domain::capability::Capability;
use crate::error::SwarmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Spawning,
    Active,
    Solving,
    Completed,
    Failed,
    Expired,
    Dissolving,
}

/// What happens to a worker once it has dissolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    ReturnToPool,
    Destroy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub capability: Capability,
    state: WorkerState,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// Upper bound on a single `Solving` phase.
    pub deadline_ms: u64,
    #[serde(skip)]
    reusable: bool,
}

impl Worker {
    pub fn new(capability: Capability, deadline_ms: u64) -> Self {
        Self {
            id: WorkerId::new(),
            capability,
            state: WorkerState::Spawning,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            deadline_ms,
            reusable: false,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Milliseconds spent solving the current task, once it has finished.
    pub fn lifespan_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    pub fn activate(&mut self) -> Result<(), SwarmError> {
        self.transition(WorkerState::Spawning, WorkerState::Active)
    }

    pub fn begin_solving(&mut self) -> Result<(), SwarmError> {
        self.transition(WorkerState::Active, WorkerState::Solving)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), SwarmError> {
        self.finish(WorkerState::Completed)
    }

    pub fn fail(&mut self) -> Result<(), SwarmError> {
        self.finish(WorkerState::Failed)
    }

    pub fn expire(&mut self) -> Result<(), SwarmError> {
        self.finish(WorkerState::Expired)
    }

    /// Leave a terminal state. Only completed workers may be reused.
    pub fn dissolve(&mut self) -> Result<Disposition, SwarmError> {
        let disposition = match self.state {
            WorkerState::Completed => Disposition::ReturnToPool,
            WorkerState::Failed | WorkerState::Expired => Disposition::Destroy,
            other => {
                return Err(SwarmError::InvalidTransition {
                    from: other,
                    to: WorkerState::Dissolving,
                })
            }
        };
        self.reusable = disposition == Disposition::ReturnToPool;
        self.state = WorkerState::Dissolving;
        Ok(disposition)
    }

    /// Clear per-task timestamps and make the worker available again.
    pub fn reset(&mut self) -> Result<(), SwarmError> {
        if self.state != WorkerState::Dissolving || !self.reusable {
            return Err(SwarmError::InvalidTransition {
                from: self.state,
                to: WorkerState::Active,
            });
        }
        self.started_at = None;
        self.completed_at = None;
        self.reusable = false;
        self.state = WorkerState::Active;
        Ok(())
    }

    fn finish(&mut self, to: WorkerState) -> Result<(), SwarmError> {
        self.transition(WorkerState::Solving, to)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, expected: WorkerState, to: WorkerState) -> Result<(), SwarmError> {
        if self.state != expected {
            return Err(SwarmError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }
}
