// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `augur-swarm`: Ephemeral Worker Pools
//!
//! Bounded-time, capability-typed analysis workers drawn from per-capability
//! pools and returned after each task. A worker is not a thread or a process:
//! it is an identity plus a lifecycle state that wraps exactly one task
//! execution under a deadline.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Worker`, `WorkerState`, `Capability`, `TaskKind` |
//! | [`application`] | Application | `WorkerPoolCoordinator`, `TaskHandler` |
//! | [`error`] | |  `SwarmError` |
//!
//! ## Key Concepts
//!
//! - **Capability**: the category of analysis a worker performs. Chosen once per
//!   task by [`classify`] over an explicit [`TaskKind`] tag.
//! - **Dispatch**: acquire a global concurrency permit, pop (or spawn) a worker,
//!   run the task outside any lock, then reset-and-return or destroy it.
//! - **Expiry**: a task that outlives its deadline is abandoned; the worker is
//!   destroyed and the pool backfills on the next demand.

pub mod application;
pub mod domain;
pub mod error;

pub use application::*;
pub use domain::*;
pub use error::SwarmError;
