// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and algorithms for outcome prediction. The only I/O here is the
//! predictor's snapshot file and the config loader.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`pattern`] | `CommandPattern`, `LearnedPattern`, `PatternAggregate`, `confidence` |
//! | [`context`] | `ToolContext` |
//! | [`prediction`] | `PredictionRequest`, `PredictionResult`, `Warning`, `Suggestion`, `RiskDimension` |
//! | [`similarity`] | `structural_similarity`, `params_hash`, `SIMILARITY_FLOOR` |
//! | [`features`] | `FeatureExtractor`, `HeuristicFeatureExtractor` |
//! | [`neural`] | `NeuralPredictor`, `RiskModel`, `RiskVector` |
//! | [`repository`] | `PatternStore`, `StoreError` |
//! | [`config`] | `AugurConfig` |

pub mod config;
pub mod context;
pub mod features;
pub mod neural;
pub mod pattern;
pub mod prediction;
pub mod repository;
pub mod similarity;
