// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`augur-core`)
//!
//! HTTP surface that translates external requests into engine calls. **No
//! business logic lives here**; all real work is delegated to
//! [`crate::application::engine::AugurEngine`].
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Predict, learn, analyze, stats and learned-pattern endpoints |

pub mod api;
