// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Bodies
//!
//! [`StoreBackedHandler`] is the [`TaskHandler`] the worker pools run. Every
//! body reads the pattern store and does bounded in-memory work; none of them
//! write anything or keep state between tasks.
//!
//! | Capability | Store reads | Report |
//! |------------|-------------|--------|
//! | `PatternMatcher` | `similar` | [`PatternMatchReport`] |
//! | `OutcomePredictor` | `aggregate`, `similar` | [`OutcomeReport`] |
//! | `AlternativeGenerator` | `successful` | [`AlternativesReport`] |
//! | `ContextAnalyzer` | `recent`, sequence `learned` | [`ContextReport`] |
//! | `ErrorAnalyzer` | `recent` | [`ErrorReport`] |
//! | `PerformanceAnalyzer` | `recent` | [`PerformanceReport`] |
//! | `Solver` / `Analyzer` / `Optimizer` | none | shape digest, structure, canonical params |

use crate::domain::config::SynthesisConfig;
use crate::domain::context::ToolContext;
use crate::domain::pattern::{hour_and_weekday, CommandPattern, ErrorFrequency, LearnedPattern, Outcome};
use crate::domain::prediction::{classify_error, RiskDimension, Suggestion};
use crate::domain::repository::PatternStore;
use crate::domain::similarity::{
    canonicalize, params_hash, shape_digest, structural_similarity, summarize, StructureSummary,
};
use anyhow::Result;
use async_trait::async_trait;
use augur_swarm::{Capability, TaskHandler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Consecutive failures at which the streak flag fires.
const FAILURE_STREAK_FLAG: u32 = 3;
const FAILURE_STREAK_SATURATION: f64 = 5.0;
/// Trend ratio (newer half mean / older half mean) considered a slowdown.
const SLOW_TREND_RATIO: f64 = 1.5;
/// Fraction of the auth token TTL after which the token counts as stale.
pub const STALE_AUTH_FRACTION: f64 = 0.75;

/// The unit of work handed to a worker. Shared by every worker of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTask {
    pub tool: String,
    pub params: Value,
    pub context: ToolContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    pub pattern_id: Uuid,
    pub similarity: f64,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatchReport {
    pub matches: Vec<PatternMatch>,
    /// Similarity-weighted success share of the matches.
    pub weighted_success_rate: Option<f64>,
    pub best_match: Option<PatternMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeReport {
    pub success_rate: f64,
    pub attempts: u64,
    pub estimated_duration_ms: Option<u64>,
    pub failure_modes: Vec<ErrorFrequency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativesReport {
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Proceed,
    ProceedWithCaution,
    Defer,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "proceed",
            Recommendation::ProceedWithCaution => "proceed_with_caution",
            Recommendation::Defer => "defer",
        }
    }

    pub fn from_risk(risk: f64) -> Self {
        if risk >= 0.6 {
            Recommendation::Defer
        } else if risk >= 0.3 {
            Recommendation::ProceedWithCaution
        } else {
            Recommendation::Proceed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextReport {
    pub failure_streak: u32,
    pub sequence_success_rate: Option<f64>,
    pub flags: Vec<String>,
    pub risk: f64,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    pub error: String,
    pub count: u64,
    pub dimension: Option<RiskDimension>,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub examined: usize,
    pub groups: Vec<ErrorGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub samples: usize,
    pub mean_ms: Option<f64>,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub trend_ratio: Option<f64>,
    pub slow: bool,
}

/// Result of one capability body, tagged with the capability that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum CapabilityOutput {
    PatternMatcher(PatternMatchReport),
    OutcomePredictor(OutcomeReport),
    AlternativeGenerator(AlternativesReport),
    ContextAnalyzer(ContextReport),
    ErrorAnalyzer(ErrorReport),
    PerformanceAnalyzer(PerformanceReport),
    Solver { digest: String },
    Analyzer(StructureSummary),
    Optimizer { params: Value },
}

impl CapabilityOutput {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityOutput::PatternMatcher(_) => Capability::PatternMatcher,
            CapabilityOutput::OutcomePredictor(_) => Capability::OutcomePredictor,
            CapabilityOutput::AlternativeGenerator(_) => Capability::AlternativeGenerator,
            CapabilityOutput::ContextAnalyzer(_) => Capability::ContextAnalyzer,
            CapabilityOutput::ErrorAnalyzer(_) => Capability::ErrorAnalyzer,
            CapabilityOutput::PerformanceAnalyzer(_) => Capability::PerformanceAnalyzer,
            CapabilityOutput::Solver { .. } => Capability::Solver,
            CapabilityOutput::Analyzer(_) => Capability::Analyzer,
            CapabilityOutput::Optimizer { .. } => Capability::Optimizer,
        }
    }
}

pub struct StoreBackedHandler {
    store: Arc<dyn PatternStore>,
    settings: SynthesisConfig,
}

impl StoreBackedHandler {
    pub fn new(store: Arc<dyn PatternStore>, settings: SynthesisConfig) -> Self {
        Self { store, settings }
    }

    async fn match_patterns(&self, task: &AnalysisTask) -> Result<PatternMatchReport> {
        let similar = self
            .store
            .similar(&task.tool, &task.params, self.settings.similar_limit)
            .await?;

        let matches: Vec<PatternMatch> = similar
            .iter()
            .map(|p| PatternMatch {
                pattern_id: p.id,
                similarity: structural_similarity(&task.params, &p.params),
                outcome: p.outcome,
                duration_ms: p.duration_ms,
                timestamp_ms: p.timestamp_ms,
            })
            .collect();

        let weight: f64 = matches.iter().map(|m| m.similarity).sum();
        let weighted_success_rate = (weight > 0.0).then(|| {
            matches
                .iter()
                .filter(|m| m.outcome.is_success())
                .map(|m| m.similarity)
                .sum::<f64>()
                / weight
        });
        // Matches arrive newest first, so ties keep the newest.
        let best_match = matches.iter().fold(None::<&PatternMatch>, |best, m| match best {
            Some(b) if b.similarity >= m.similarity => Some(b),
            _ => Some(m),
        });

        Ok(PatternMatchReport {
            best_match: best_match.cloned(),
            weighted_success_rate,
            matches,
        })
    }

    async fn predict_outcome(&self, task: &AnalysisTask) -> Result<OutcomeReport> {
        let aggregate = self.store.aggregate(&task.tool).await?;
        let similar = self
            .store
            .similar(&task.tool, &task.params, self.settings.similar_limit)
            .await?;

        let estimated_duration_ms = if similar.is_empty() {
            aggregate.avg_duration_ms
        } else {
            Some(similar.iter().map(|p| p.duration_ms as f64).sum::<f64>() / similar.len() as f64)
        };

        Ok(OutcomeReport {
            success_rate: aggregate.success_rate(),
            attempts: aggregate.total,
            estimated_duration_ms: estimated_duration_ms.map(|d| d.round() as u64),
            failure_modes: aggregate.top_errors,
        })
    }

    async fn generate_alternatives(&self, task: &AnalysisTask) -> Result<AlternativesReport> {
        let successful = self
            .store
            .successful(&task.tool, self.settings.analysis_window)
            .await?;
        let request_hash = params_hash(&task.params);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for p in &successful {
            *counts.entry(p.params_hash.as_str()).or_default() += 1;
        }

        let mut seen = HashSet::new();
        let mut candidates: Vec<(&CommandPattern, f64)> = successful
            .iter()
            .filter(|p| p.params_hash != request_hash && seen.insert(p.params_hash.as_str()))
            .map(|p| (p, structural_similarity(&task.params, &p.params)))
            .collect();
        // Stable sort: equal similarity keeps newest first.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(self.settings.suggestion_limit);

        let suggestions = candidates
            .into_iter()
            .map(|(p, similarity)| {
                let successes = counts.get(p.params_hash.as_str()).copied().unwrap_or(1);
                Suggestion {
                    tool: p.tool.clone(),
                    params: p.params.clone(),
                    rationale: format!(
                        "Succeeded {successes} time(s) recently with {:.0}% structural similarity",
                        similarity * 100.0
                    ),
                    similarity,
                    source_pattern_id: p.id,
                }
            })
            .collect();

        Ok(AlternativesReport { suggestions })
    }

    async fn analyze_context(&self, task: &AnalysisTask) -> Result<ContextReport> {
        let recent = self
            .store
            .recent(&task.tool, self.settings.analysis_window)
            .await?;
        let failure_streak = recent
            .iter()
            .take_while(|p| p.outcome == Outcome::Failure)
            .count() as u32;

        let sequence_success_rate = match task.context.previous_tool() {
            Some(previous) => self
                .store
                .learned(LearnedPattern::sequence_id(previous, &task.tool))
                .await?
                .and_then(|p| p.sequence_success_rate()),
            None => None,
        };

        let (hour, weekday) = hour_and_weekday(task.context.effective_timestamp_ms());
        let weekend = weekday >= 6;
        let stale_auth = task
            .context
            .auth_token_age_minutes
            .is_some_and(|age| age >= self.settings.auth_token_ttl_minutes * STALE_AUTH_FRACTION);
        let repeated_tool = task.context.previous_tool() == Some(task.tool.as_str());
        let risky_sequence = sequence_success_rate.is_some_and(|rate| rate < 0.5);

        let mut flags = Vec::new();
        if !weekend && (9..=17).contains(&hour) {
            flags.push("business_hours".to_string());
        }
        if weekend {
            flags.push("weekend".to_string());
        }
        if stale_auth {
            flags.push("stale_auth_token".to_string());
        }
        if repeated_tool {
            flags.push("repeated_tool".to_string());
        }
        if failure_streak >= FAILURE_STREAK_FLAG {
            flags.push("failure_streak".to_string());
        }
        if risky_sequence {
            flags.push("risky_sequence".to_string());
        }

        let mut risk = 0.4 * (f64::from(failure_streak) / FAILURE_STREAK_SATURATION).min(1.0);
        if let Some(rate) = sequence_success_rate {
            risk += 0.3 * (1.0 - rate);
        }
        if stale_auth {
            risk += 0.2;
        }
        if repeated_tool && failure_streak > 0 {
            risk += 0.1;
        }
        let risk = risk.clamp(0.0, 1.0);

        Ok(ContextReport {
            failure_streak,
            sequence_success_rate,
            flags,
            risk,
            recommendation: Recommendation::from_risk(risk),
        })
    }

    async fn analyze_errors(&self, task: &AnalysisTask) -> Result<ErrorReport> {
        let recent = self
            .store
            .recent(&task.tool, self.settings.analysis_window)
            .await?;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for p in recent.iter().filter(|p| p.outcome == Outcome::Failure) {
            *counts.entry(p.error.as_deref().unwrap_or("unknown error")).or_default() += 1;
        }

        let mut groups: Vec<ErrorGroup> = counts
            .into_iter()
            .map(|(error, count)| {
                let dimension = classify_error(error);
                ErrorGroup {
                    error: error.to_string(),
                    count,
                    dimension,
                    resolution: resolution_hint(dimension).to_string(),
                }
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));

        Ok(ErrorReport {
            examined: recent.len(),
            groups,
        })
    }

    async fn analyze_performance(&self, task: &AnalysisTask) -> Result<PerformanceReport> {
        let recent = self
            .store
            .recent(&task.tool, self.settings.analysis_window)
            .await?;
        let durations: Vec<u64> = recent.iter().map(|p| p.duration_ms).collect();
        Ok(performance_report(&durations))
    }
}

fn resolution_hint(dimension: Option<RiskDimension>) -> &'static str {
    match dimension {
        Some(RiskDimension::Syntax) => "Validate the parameters against the tool's expected syntax",
        Some(RiskDimension::Permission) => "Refresh credentials or check access grants",
        Some(RiskDimension::CostPerformance) => "Narrow the request scope or retry with backoff",
        None => "Retry with backoff and inspect the tool's logs",
    }
}

fn mean(values: &[u64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<u64>() as f64 / values.len() as f64)
}

/// Nearest-rank percentile over an ascending slice.
fn percentile(sorted: &[u64], pct: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.clamp(1, sorted.len()) - 1).copied()
}

/// `durations` newest first.
fn performance_report(durations: &[u64]) -> PerformanceReport {
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();

    let trend_ratio = if durations.len() >= 4 {
        let (newer, older) = durations.split_at(durations.len() / 2);
        match (mean(newer), mean(older)) {
            (Some(n), Some(o)) if o > 0.0 => Some(n / o),
            _ => None,
        }
    } else {
        None
    };

    PerformanceReport {
        samples: durations.len(),
        mean_ms: mean(durations),
        p50_ms: percentile(&sorted, 50.0),
        p95_ms: percentile(&sorted, 95.0),
        trend_ratio,
        slow: trend_ratio.is_some_and(|r| r >= SLOW_TREND_RATIO),
    }
}

#[async_trait]
impl TaskHandler<AnalysisTask, CapabilityOutput> for StoreBackedHandler {
    async fn run(&self, capability: Capability, task: &AnalysisTask) -> Result<CapabilityOutput> {
        let output = match capability {
            Capability::PatternMatcher => CapabilityOutput::PatternMatcher(self.match_patterns(task).await?),
            Capability::OutcomePredictor => CapabilityOutput::OutcomePredictor(self.predict_outcome(task).await?),
            Capability::AlternativeGenerator => {
                CapabilityOutput::AlternativeGenerator(self.generate_alternatives(task).await?)
            }
            Capability::ContextAnalyzer => CapabilityOutput::ContextAnalyzer(self.analyze_context(task).await?),
            Capability::ErrorAnalyzer => CapabilityOutput::ErrorAnalyzer(self.analyze_errors(task).await?),
            Capability::PerformanceAnalyzer => {
                CapabilityOutput::PerformanceAnalyzer(self.analyze_performance(task).await?)
            }
            Capability::Solver => CapabilityOutput::Solver {
                digest: shape_digest(&task.params),
            },
            Capability::Analyzer => CapabilityOutput::Analyzer(summarize(&task.params)),
            Capability::Optimizer => CapabilityOutput::Optimizer {
                params: canonicalize(&task.params, true),
            },
        };
        Ok(output)
    }
}
