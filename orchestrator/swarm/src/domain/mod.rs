// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for ephemeral workers. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`capability`] | `Capability`, `TaskKind`, `classify` |
//! | [`pool`] | `PoolConfig`, `PoolStats` |
//! | [`worker`] | `Worker`, `WorkerId`, `WorkerState` |

pub mod capability;
pub mod pool;
pub mod worker;

pub use capability::*;
pub use pool::*;
pub use worker::*;
