// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`capabilities`] | `StoreBackedHandler` and the per-capability reports |
//! | [`synthesizer`] | `PredictionSynthesizer`: fan-out, deadline, blend |
//! | [`learning`] | `LearningService`: bounded learn queue and its consumer |
//! | [`repository_factory`] | Store backend selection |
//! | [`engine`] | `AugurEngine` facade |

pub mod capabilities;
pub mod engine;
pub mod learning;
pub mod repository_factory;
pub mod synthesizer;

pub use engine::{AnalyzeError, AugurEngine, EngineStats};
pub use learning::LearningService;
pub use synthesizer::PredictionSynthesizer;
