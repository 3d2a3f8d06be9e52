// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Prediction Synthesizer
//!
//! Fans one validated request out to the pattern store, the risk model and the
//! prediction plan's workers, waits for all of them under a single deadline,
//! then folds whatever arrived into a [`PredictionResult`].
//!
//! Gathering ([`PredictionSynthesizer::gather`]) and combining ([`synthesize`])
//! are separate: the combination is a pure function of the gathered signals.
//!
//! ## Signals
//!
//! | Signal | Source | Weight |
//! |--------|--------|--------|
//! | historical | `aggregate` (+ `PatternMatcher` similar-params rate) | `weights.historical` |
//! | neural | success head of the risk model | `weights.neural` |
//! | context | time window delta, auth token age, `ContextAnalyzer` risk | `weights.context` |
//!
//! Missing signals drop out of the weighted mean and the remaining weights
//! renormalize. Confidence is scaled by the share of the six expected inputs
//! (store, model, four workers) that answered.

use crate::application::capabilities::{
    AlternativesReport, AnalysisTask, CapabilityOutput, ContextReport, OutcomeReport,
    PatternMatchReport, STALE_AUTH_FRACTION,
};
use crate::domain::config::SynthesisConfig;
use crate::domain::context::ToolContext;
use crate::domain::features::FeatureExtractor;
use crate::domain::neural::{InferenceError, RiskModel, RiskVector};
use crate::domain::pattern::{confidence, hour_and_weekday, PatternAggregate};
use crate::domain::prediction::{
    classify_error, PredictionError, PredictionRequest, PredictionResult, RiskBreakdown, Severity,
    Signal, SignalStatus, Warning,
};
use crate::domain::repository::PatternStore;
use augur_swarm::{classify, Capability, SwarmError, TaskKind, WorkerPoolCoordinator};
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Store, model and one per planned worker.
pub const EXPECTED_SIGNALS: usize = 2 + TaskKind::PREDICTION_PLAN.len();

/// Tool-wide and time-window history for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub overall: PatternAggregate,
    pub window: PatternAggregate,
}

/// Everything that answered before the deadline.
#[derive(Debug, Clone, Default)]
pub struct Gathered {
    pub history: Option<History>,
    pub model: Option<RiskVector>,
    /// Model evidence at the time of inference; 0 when the model did not answer.
    pub model_evidence: f64,
    pub pattern_match: Option<PatternMatchReport>,
    pub outcome: Option<OutcomeReport>,
    pub context: Option<ContextReport>,
    pub alternatives: Option<AlternativesReport>,
    pub signals: Vec<Signal>,
}

impl Gathered {
    fn record_worker(&mut self, capability: Capability, result: Result<CapabilityOutput, SwarmError>) {
        let source = capability.as_str();
        match result {
            Ok(output) => {
                self.signals.push(Signal::used(source, None));
                match output {
                    CapabilityOutput::PatternMatcher(r) => self.pattern_match = Some(r),
                    CapabilityOutput::OutcomePredictor(r) => self.outcome = Some(r),
                    CapabilityOutput::ContextAnalyzer(r) => self.context = Some(r),
                    CapabilityOutput::AlternativeGenerator(r) => self.alternatives = Some(r),
                    other => debug!(capability = %other.capability(), "Ignoring unplanned worker output"),
                }
            }
            Err(e) => {
                let status = match e {
                    SwarmError::CapacityExceeded { .. } => SignalStatus::Refused,
                    SwarmError::WorkerExpired { .. } => SignalStatus::TimedOut,
                    SwarmError::WorkerFailed { .. } | SwarmError::InvalidTransition { .. } => {
                        SignalStatus::Failed
                    }
                };
                self.signals.push(Signal::missing(source, status, e.to_string()));
            }
        }
    }

    fn used_count(&self) -> usize {
        self.signals.iter().filter(|s| s.is_used()).count()
    }
}

pub struct PredictionSynthesizer {
    store: Arc<dyn PatternStore>,
    model: Arc<dyn RiskModel>,
    extractor: Arc<dyn FeatureExtractor>,
    coordinator: Arc<WorkerPoolCoordinator<AnalysisTask, CapabilityOutput>>,
    settings: SynthesisConfig,
}

impl PredictionSynthesizer {
    pub fn new(
        store: Arc<dyn PatternStore>,
        model: Arc<dyn RiskModel>,
        extractor: Arc<dyn FeatureExtractor>,
        coordinator: Arc<WorkerPoolCoordinator<AnalysisTask, CapabilityOutput>>,
        settings: SynthesisConfig,
    ) -> Self {
        Self {
            store,
            model,
            extractor,
            coordinator,
            settings,
        }
    }

    pub fn settings(&self) -> &SynthesisConfig {
        &self.settings
    }

    pub async fn predict(&self, request: PredictionRequest) -> Result<PredictionResult, PredictionError> {
        let started = Instant::now();
        let request = request.validated()?;
        let deadline = started + self.settings.request_deadline;

        let gathered = self.gather(&request, deadline).await;

        let refused = gathered
            .signals
            .iter()
            .filter(|s| s.status == SignalStatus::Refused)
            .count();
        if refused == TaskKind::PREDICTION_PLAN.len() {
            warn!(tool = %request.tool, "Every planned worker was refused for capacity");
            return Err(PredictionError::CapacityExceeded);
        }

        let result = synthesize(&self.settings, &request.context, gathered);

        let elapsed = started.elapsed();
        metrics::counter!("augur_predictions_total").increment(1);
        metrics::histogram!("augur_prediction_duration_seconds").record(elapsed.as_secs_f64());
        debug!(
            tool = %request.tool,
            success_probability = result.success_probability,
            confidence = result.confidence,
            elapsed_ms = elapsed.as_millis() as u64,
            "Prediction synthesized"
        );
        Ok(result)
    }

    /// Query the store, the model and the planned workers concurrently. Nothing
    /// that misses `deadline` contributes.
    pub async fn gather(&self, request: &PredictionRequest, deadline: Instant) -> Gathered {
        let tool = request.tool.as_str();
        let (hour, weekday) = hour_and_weekday(request.context.effective_timestamp_ms());
        let task = AnalysisTask {
            tool: request.tool.clone(),
            params: request.params.clone(),
            context: request.context.clone(),
        };

        let history = timeout_at(deadline, async {
            tokio::try_join!(
                self.store.aggregate(tool),
                self.store
                    .time_correlated(tool, hour, weekday, self.settings.hour_window),
            )
        });

        let inference_deadline = deadline.min(Instant::now() + self.settings.inference_budget);
        let budget_ms = self.settings.inference_budget.as_millis() as u64;
        let features = self.extractor.extract(tool, &request.params);
        let inference = async {
            match timeout_at(inference_deadline, self.model.infer(&features)).await {
                Ok(result) => result,
                Err(_) => Err(InferenceError::Timeout { budget_ms }),
            }
        };

        let workers = join_all(TaskKind::PREDICTION_PLAN.iter().map(|kind| {
            let capability = classify(*kind);
            let task = &task;
            async move { (capability, self.coordinator.dispatch(capability, task, deadline).await) }
        }));

        let (history, inference, workers) = tokio::join!(history, inference, workers);

        let mut gathered = Gathered::default();

        match history {
            Ok(Ok((overall, window))) => {
                gathered.signals.push(Signal::used("pattern_store", Some(overall.success_rate())));
                gathered.history = Some(History { overall, window });
            }
            Ok(Err(e)) => {
                warn!(tool, error = %e, "Pattern store unavailable; predicting without history");
                metrics::counter!("augur_signals_missing_total", "source" => "pattern_store").increment(1);
                gathered
                    .signals
                    .push(Signal::missing("pattern_store", SignalStatus::Unavailable, e.to_string()));
            }
            Err(_) => {
                debug!(tool, "Pattern store missed the request deadline");
                metrics::counter!("augur_signals_missing_total", "source" => "pattern_store").increment(1);
                gathered.signals.push(Signal::missing(
                    "pattern_store",
                    SignalStatus::TimedOut,
                    "missed the request deadline",
                ));
            }
        }

        match inference {
            Ok(risks) => {
                gathered.signals.push(Signal::used("risk_model", Some(risks.success)));
                gathered.model = Some(risks);
                gathered.model_evidence = self.model.evidence();
            }
            Err(e) => {
                let status = match e {
                    InferenceError::Timeout { .. } => SignalStatus::TimedOut,
                    _ => SignalStatus::Failed,
                };
                warn!(tool, error = %e, "Risk model unavailable; predicting without it");
                metrics::counter!("augur_signals_missing_total", "source" => "risk_model").increment(1);
                gathered
                    .signals
                    .push(Signal::missing("risk_model", status, e.to_string()));
            }
        }

        for (capability, result) in workers {
            gathered.record_worker(capability, result);
        }

        gathered
    }
}

/// Linear ramp from 0 at [`STALE_AUTH_FRACTION`] of the TTL to 0.5 at the TTL.
pub fn auth_penalty(age_minutes: Option<f64>, ttl_minutes: f64) -> f64 {
    let Some(age) = age_minutes else {
        return 0.0;
    };
    if ttl_minutes <= 0.0 {
        return 0.0;
    }
    let start = ttl_minutes * STALE_AUTH_FRACTION;
    if age <= start {
        0.0
    } else if age >= ttl_minutes {
        0.5
    } else {
        0.5 * (age - start) / (ttl_minutes - start)
    }
}

/// Weighted mean of `(weight, probability)` pairs around the neutral point.
pub fn blend(signals: &[(f64, f64)]) -> f64 {
    let total: f64 = signals.iter().map(|(w, _)| w).sum();
    if total <= 0.0 {
        return 0.5;
    }
    let shift: f64 = signals.iter().map(|(w, p)| w * (p - 0.5)).sum::<f64>() / total;
    (0.5 + shift).clamp(0.0, 1.0)
}

/// Evidence-weighted blend of historical confidence and model decisiveness.
pub fn blended_confidence(historical: f64, model_output: Option<f64>, model_evidence: f64) -> f64 {
    let (magnitude, evidence) = match model_output {
        Some(p) => ((p - 0.5).abs() * 2.0, model_evidence),
        None => (0.0, 0.0),
    };
    let weight = historical + evidence;
    if weight <= 0.0 {
        return 0.0;
    }
    ((historical * historical + magnitude * evidence) / weight).clamp(0.0, 1.0)
}

pub fn synthesize(settings: &SynthesisConfig, context: &ToolContext, gathered: Gathered) -> PredictionResult {
    let saturation = settings.confidence_saturation;
    let weights = settings.weights;

    // historical
    let mut historical_confidence = 0.0;
    let mut signals: Vec<(f64, f64)> = Vec::with_capacity(3);
    if let Some(history) = &gathered.history {
        let overall = &history.overall;
        let mut raw = overall.success_rate();
        if let Some(similar_rate) = gathered
            .pattern_match
            .as_ref()
            .and_then(|m| m.weighted_success_rate)
        {
            raw = (raw + similar_rate) / 2.0;
        }
        historical_confidence = confidence(overall.total, saturation);
        let p = if overall.total == 0 {
            0.5
        } else {
            0.5 + historical_confidence * (raw - 0.5)
        };
        signals.push((weights.historical, p));
    }

    // neural
    if let Some(risks) = &gathered.model {
        signals.push((weights.neural, risks.success));
    }

    // context
    let time_delta = gathered.history.as_ref().map_or(0.0, |h| {
        if h.overall.total == 0 {
            0.0
        } else {
            (h.window.success_rate() - h.overall.success_rate()) * confidence(h.window.total, saturation)
        }
    });
    let penalty = auth_penalty(context.auth_token_age_minutes, settings.auth_token_ttl_minutes);
    let context_risk = gathered.context.as_ref().map_or(0.0, |c| c.risk);
    let p_context =
        (0.5 + time_delta - penalty - context_risk * settings.context_risk_weight).clamp(0.0, 1.0);
    signals.push((weights.context, p_context));

    let success_probability = blend(&signals);

    let used = gathered.used_count();
    let coverage = used as f64 / EXPECTED_SIGNALS as f64;
    let confidence = blended_confidence(
        historical_confidence,
        gathered.model.as_ref().map(|r| r.success),
        gathered.model_evidence,
    ) * coverage;

    // dominant risk dimension
    let mut risk_breakdown = gathered
        .model
        .as_ref()
        .map(RiskBreakdown::from_model)
        .unwrap_or_default();
    let top_error = gathered
        .history
        .as_ref()
        .and_then(|h| h.overall.top_errors.first().map(|e| (e, h.overall.failures())));
    if let Some(history) = &gathered.history {
        let failures = history.overall.failures();
        if failures > 0 {
            for error in &history.overall.top_errors {
                if let Some(dimension) = classify_error(&error.error) {
                    risk_breakdown.add(dimension, error.count as f64 / failures as f64);
                }
            }
        }
    }
    let dominant = risk_breakdown.dominant();

    let mut warnings = Vec::new();
    let cited = top_error
        .map(|(e, failures)| {
            format!(
                "; most frequent error '{}' ({} of {} failures)",
                e.error, e.count, failures
            )
        })
        .unwrap_or_default();
    if success_probability < settings.high_risk_threshold && confidence > settings.high_confidence_threshold {
        warnings.push(Warning {
            severity: Severity::High,
            dimension: dominant,
            message: format!(
                "High failure risk ({:.0}% success), dominated by {} risk{}",
                success_probability * 100.0,
                dominant.label(),
                cited
            ),
        });
    } else if success_probability >= settings.high_risk_threshold
        && success_probability < settings.medium_risk_threshold
    {
        warnings.push(Warning {
            severity: Severity::Medium,
            dimension: dominant,
            message: format!(
                "Elevated failure risk ({:.0}% success), mostly {} risk{}",
                success_probability * 100.0,
                dominant.label(),
                cited
            ),
        });
    }

    let estimated_duration_ms = gathered
        .outcome
        .as_ref()
        .and_then(|o| o.estimated_duration_ms)
        .or_else(|| {
            gathered
                .history
                .as_ref()
                .and_then(|h| h.overall.avg_duration_ms)
                .map(|d| d.round() as u64)
        });
    let estimated_cost = gathered.model.as_ref().map(|r| r.cost_performance);

    let explanation = explain(&gathered, success_probability, used);
    let suggestions = gathered
        .alternatives
        .map(|a| a.suggestions)
        .unwrap_or_default();
    let context_flags = gathered.context.map(|c| c.flags).unwrap_or_default();

    PredictionResult {
        success_probability,
        confidence,
        warnings,
        suggestions,
        estimated_cost,
        estimated_duration_ms,
        explanation,
        risk_breakdown,
        signals: gathered.signals,
        context_flags,
    }
}

fn explain(gathered: &Gathered, success_probability: f64, used: usize) -> String {
    let mut parts = Vec::new();
    match &gathered.history {
        Some(h) if h.overall.total > 0 => parts.push(format!(
            "{} past executions with {:.0}% success",
            h.overall.total,
            h.overall.success_rate() * 100.0
        )),
        Some(_) => parts.push("no execution history for this tool".to_string()),
        None => parts.push("execution history unavailable".to_string()),
    }
    if let Some(rate) = gathered.pattern_match.as_ref().and_then(|m| m.weighted_success_rate) {
        parts.push(format!("similar parameters succeeded {:.0}% of the time", rate * 100.0));
    }
    if let Some(risks) = &gathered.model {
        parts.push(format!("model estimates {:.0}% success", risks.success * 100.0));
    }
    if let Some(context) = &gathered.context {
        parts.push(format!("context recommends {}", context.recommendation.as_str()));
    }
    format!(
        "Predicted {:.0}% success from {}/{} signals: {}.",
        success_probability * 100.0,
        used,
        EXPECTED_SIGNALS,
        parts.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capabilities::Recommendation;
    use crate::domain::pattern::ErrorFrequency;
    use crate::domain::prediction::RiskDimension;

    fn aggregate(total: u64, successes: u64, errors: &[(&str, u64)]) -> PatternAggregate {
        PatternAggregate {
            total,
            successes,
            avg_duration_ms: (total > 0).then_some(120.0),
            top_errors: errors
                .iter()
                .map(|(e, c)| ErrorFrequency {
                    error: e.to_string(),
                    count: *c,
                })
                .collect(),
        }
    }

    fn all_used(gathered: &mut Gathered, workers: usize) {
        gathered.signals.push(Signal::used("pattern_store", None));
        gathered.signals.push(Signal::used("risk_model", None));
        for _ in 0..workers {
            gathered.signals.push(Signal::used("worker", None));
        }
    }

    #[test]
    fn test_blend_renormalizes_missing_weights() {
        assert_eq!(blend(&[]), 0.5);
        assert!((blend(&[(0.6, 0.0), (0.1, 0.5)]) - (0.5 - 0.6 * 0.5 / 0.7)).abs() < 1e-12);
        assert!((blend(&[(0.3, 1.0)]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_auth_penalty_ramp() {
        assert_eq!(auth_penalty(None, 60.0), 0.0);
        assert_eq!(auth_penalty(Some(30.0), 60.0), 0.0);
        assert_eq!(auth_penalty(Some(45.0), 60.0), 0.0);
        assert!((auth_penalty(Some(52.5), 60.0) - 0.25).abs() < 1e-12);
        assert_eq!(auth_penalty(Some(60.0), 60.0), 0.5);
        assert_eq!(auth_penalty(Some(600.0), 60.0), 0.5);
    }

    #[test]
    fn test_confidence_without_evidence_is_zero() {
        assert_eq!(blended_confidence(0.0, Some(0.5), 0.0), 0.0);
        assert_eq!(blended_confidence(0.0, None, 0.0), 0.0);
        assert!((blended_confidence(0.8, None, 0.0) - 0.8).abs() < 1e-12);
        // decisive, trusted model lifts weak history
        assert!(blended_confidence(0.2, Some(0.0), 1.0) > 0.2);
    }

    #[test]
    fn test_neutral_prior_without_history() {
        let mut gathered = Gathered {
            history: Some(History::default()),
            model: Some(RiskVector::from_array([0.5; 4])),
            ..Gathered::default()
        };
        all_used(&mut gathered, 4);

        let result = synthesize(&SynthesisConfig::default(), &ToolContext::default(), gathered);
        assert_eq!(result.success_probability, 0.5);
        assert_eq!(result.confidence, 0.0);
        assert!(result.warnings.is_empty());
        assert!(result.estimated_duration_ms.is_none());
    }

    #[test]
    fn test_failure_history_raises_high_warning_on_dominant_dimension() {
        let mut gathered = Gathered {
            history: Some(History {
                overall: aggregate(10, 0, &[("timeout", 10)]),
                window: aggregate(10, 0, &[("timeout", 10)]),
            }),
            model: Some(RiskVector::from_array([0.5; 4])),
            ..Gathered::default()
        };
        all_used(&mut gathered, 4);

        let result = synthesize(&SynthesisConfig::default(), &ToolContext::default(), gathered);
        assert!(result.success_probability < 0.3);
        assert!((result.confidence - 1.0).abs() < 1e-12);
        assert_eq!(result.warnings.len(), 1);
        let warning = &result.warnings[0];
        assert_eq!(warning.severity, Severity::High);
        assert_eq!(warning.dimension, RiskDimension::CostPerformance);
        assert!(warning.message.contains("timeout"));
        assert_eq!(result.estimated_duration_ms, Some(120));
        assert_eq!(result.estimated_cost, Some(0.5));
    }

    #[test]
    fn test_missing_model_lowers_confidence_and_renormalizes() {
        let history = History {
            overall: aggregate(10, 8, &[("denied", 2)]),
            window: aggregate(2, 2, &[]),
        };
        let mut healthy = Gathered {
            history: Some(history.clone()),
            model: Some(RiskVector::from_array([0.5; 4])),
            ..Gathered::default()
        };
        all_used(&mut healthy, 4);
        let mut degraded = Gathered {
            history: Some(history),
            ..Gathered::default()
        };
        degraded.signals.push(Signal::used("pattern_store", None));
        degraded
            .signals
            .push(Signal::missing("risk_model", SignalStatus::Failed, "boom"));
        for _ in 0..4 {
            degraded.signals.push(Signal::used("worker", None));
        }

        let settings = SynthesisConfig::default();
        let healthy = synthesize(&settings, &ToolContext::default(), healthy);
        let degraded = synthesize(&settings, &ToolContext::default(), degraded);
        assert!(degraded.confidence < healthy.confidence);
        assert!((degraded.confidence - healthy.confidence * 5.0 / 6.0).abs() < 1e-12);
        assert!(degraded.estimated_cost.is_none());
        assert!(degraded.success_probability > 0.5);
    }

    #[test]
    fn test_context_signal_penalizes_stale_token_and_risk() {
        let mut gathered = Gathered {
            history: Some(History::default()),
            context: Some(ContextReport {
                failure_streak: 0,
                sequence_success_rate: None,
                flags: vec!["stale_auth_token".to_string()],
                risk: 0.2,
                recommendation: Recommendation::Proceed,
            }),
            ..Gathered::default()
        };
        all_used(&mut gathered, 1);
        let context = ToolContext {
            auth_token_age_minutes: Some(90.0),
            ..ToolContext::default()
        };

        let result = synthesize(&SynthesisConfig::default(), &context, gathered);
        // history 0.5 (w 0.6), context 0.5 - 0.5 - 0.05 = 0 (w 0.1)
        let expected = 0.5 - 0.1 * 0.5 / 0.7;
        assert!((result.success_probability - expected).abs() < 1e-12);
        assert_eq!(result.context_flags, vec!["stale_auth_token".to_string()]);
        assert_eq!(result.warnings[0].severity, Severity::Medium);
    }
}
