// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Infrastructure Layer
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`db`] | SQLite pool and embedded migrations |
//! | [`repositories`] | `InMemoryPatternStore`, `SqlitePatternStore` |

pub mod db;
pub mod repositories;
