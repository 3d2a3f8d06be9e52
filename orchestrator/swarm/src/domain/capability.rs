// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capabilities and Task Classification
//!
//! Every task carries an explicit [`TaskKind`] tag. [`classify`] maps the tag
//! to exactly one [`Capability`]; downstream code never inspects task text to
//! decide who runs it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of analysis a worker performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PatternMatcher,
    OutcomePredictor,
    AlternativeGenerator,
    ContextAnalyzer,
    ErrorAnalyzer,
    PerformanceAnalyzer,
    Solver,
    Analyzer,
    Optimizer,
}

impl Capability {
    /// All capabilities, in pool iteration order.
    pub const ALL: [Capability; 9] = [
        Capability::PatternMatcher,
        Capability::OutcomePredictor,
        Capability::AlternativeGenerator,
        Capability::ContextAnalyzer,
        Capability::ErrorAnalyzer,
        Capability::PerformanceAnalyzer,
        Capability::Solver,
        Capability::Analyzer,
        Capability::Optimizer,
    ];

    /// Stable label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PatternMatcher => "pattern_matcher",
            Capability::OutcomePredictor => "outcome_predictor",
            Capability::AlternativeGenerator => "alternative_generator",
            Capability::ContextAnalyzer => "context_analyzer",
            Capability::ErrorAnalyzer => "error_analyzer",
            Capability::PerformanceAnalyzer => "performance_analyzer",
            Capability::Solver => "solver",
            Capability::Analyzer => "analyzer",
            Capability::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit tag attached to a task by whoever builds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Find past invocations whose parameters resemble the current ones.
    HistoryLookup,
    /// Estimate outcome and duration from the tool's aggregate history.
    OutcomeEstimate,
    /// Propose previously successful parameter sets.
    AlternativeSearch,
    /// Assess the invocation context (time, auth age, recent tool sequence).
    ContextReview,
    /// Group and explain recent failures.
    FailureDiagnosis,
    /// Summarize recent duration behaviour.
    PerformanceReview,
    GenericSolve,
    GenericAnalysis,
    GenericOptimization,
}

impl TaskKind {
    /// Tasks the prediction path fans out for every request.
    pub const PREDICTION_PLAN: [TaskKind; 4] = [
        TaskKind::HistoryLookup,
        TaskKind::OutcomeEstimate,
        TaskKind::ContextReview,
        TaskKind::AlternativeSearch,
    ];
}

/// Deterministic task classification: one tag, one capability.
pub fn classify(kind: TaskKind) -> Capability {
    match kind {
        TaskKind::HistoryLookup => Capability::PatternMatcher,
        TaskKind::OutcomeEstimate => Capability::OutcomePredictor,
        TaskKind::AlternativeSearch => Capability::AlternativeGenerator,
        TaskKind::ContextReview => Capability::ContextAnalyzer,
        TaskKind::FailureDiagnosis => Capability::ErrorAnalyzer,
        TaskKind::PerformanceReview => Capability::PerformanceAnalyzer,
        TaskKind::GenericSolve => Capability::Solver,
        TaskKind::GenericAnalysis => Capability::Analyzer,
        TaskKind::GenericOptimization => Capability::Optimizer,
    }
}

impl From<TaskKind> for Capability {
    fn from(kind: TaskKind) -> Self {
        classify(kind)
    }
}
