// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `augur-core`: Tool-Call Outcome Prediction
//!
//! Records every tool invocation, mines recurring patterns from them and
//! answers "will this call succeed?" before it runs, by blending historical
//! rates, a small neural risk model and bounded-time worker analyses.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Patterns, similarity, features, the risk model, config |
//! | [`application`] | Application | Capability handlers, synthesizer, learning, engine |
//! | [`infrastructure`] | Infrastructure | SQLite pool, pattern stores |
//! | [`presentation`] | Presentation | HTTP API |

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::engine::AugurEngine;
pub use domain::config::AugurConfig;
