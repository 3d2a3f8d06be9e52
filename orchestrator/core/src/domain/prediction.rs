// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Prediction Requests and Results
//!
//! Request-scoped value objects exchanged with callers. Nothing here is
//! persisted.

use crate::domain::context::ToolContext;
use crate::domain::neural::RiskVector;
use crate::domain::pattern::Outcome;
use augur_swarm::TaskKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Longest accepted tool name, in characters.
pub const MAX_TOOL_NAME_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub context: ToolContext,
}

impl PredictionRequest {
    pub fn new(tool: impl Into<String>, params: Value, context: ToolContext) -> Self {
        Self {
            tool: tool.into(),
            params,
            context,
        }
    }

    /// Check the tool name and parameter shape. `null` params become `{}`.
    pub fn validated(mut self) -> Result<Self, PredictionError> {
        validate_tool(&self.tool)?;
        self.params = normalize_params(self.params)?;
        self.context = self.context.pinned();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnRequest {
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    pub outcome: Outcome,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub context: ToolContext,
}

/// Run one classified capability on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub kind: TaskKind,
    pub tool: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub context: ToolContext,
}

pub fn validate_tool(tool: &str) -> Result<(), PredictionError> {
    if tool.trim().is_empty() {
        return Err(PredictionError::InvalidInput("tool name is empty".to_string()));
    }
    if tool.chars().count() > MAX_TOOL_NAME_LEN {
        return Err(PredictionError::InvalidInput(format!(
            "tool name exceeds {MAX_TOOL_NAME_LEN} characters"
        )));
    }
    if tool.chars().any(char::is_control) {
        return Err(PredictionError::InvalidInput(
            "tool name contains control characters".to_string(),
        ));
    }
    Ok(())
}

pub fn normalize_params(params: Value) -> Result<Value, PredictionError> {
    match params {
        Value::Null => Ok(Value::Object(Default::default())),
        Value::Object(_) => Ok(params),
        other => Err(PredictionError::InvalidInput(format!(
            "params must be a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every planned worker dispatch was refused for lack of capacity.
    #[error("Worker capacity exceeded")]
    CapacityExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDimension {
    Syntax,
    Permission,
    CostPerformance,
}

impl RiskDimension {
    pub const ALL: [RiskDimension; 3] = [
        RiskDimension::Syntax,
        RiskDimension::Permission,
        RiskDimension::CostPerformance,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RiskDimension::Syntax => "syntax",
            RiskDimension::Permission => "permission",
            RiskDimension::CostPerformance => "cost/performance",
        }
    }
}

impl fmt::Display for RiskDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map an error message to the risk dimension it evidences, if any.
pub fn classify_error(error: &str) -> Option<RiskDimension> {
    let error = error.to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|n| error.contains(n));
    if mentions(&["syntax", "parse", "unexpected token", "malformed", "invalid query"]) {
        Some(RiskDimension::Syntax)
    } else if mentions(&["permission", "denied", "unauthorized", "forbidden", "auth", "credential"]) {
        Some(RiskDimension::Permission)
    } else if mentions(&["timeout", "timed out", "quota", "exceeded", "memory", "too large", "rate limit"]) {
        Some(RiskDimension::CostPerformance)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub severity: Severity,
    pub dimension: RiskDimension,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub tool: String,
    pub params: Value,
    pub rationale: String,
    pub similarity: f64,
    pub source_pattern_id: uuid::Uuid,
}

/// Per-dimension risk used to pick the dominant warning dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBreakdown {
    pub syntax: f64,
    pub permission: f64,
    pub cost_performance: f64,
}

impl RiskBreakdown {
    pub fn get(&self, dimension: RiskDimension) -> f64 {
        match dimension {
            RiskDimension::Syntax => self.syntax,
            RiskDimension::Permission => self.permission,
            RiskDimension::CostPerformance => self.cost_performance,
        }
    }

    pub fn add(&mut self, dimension: RiskDimension, amount: f64) {
        let slot = match dimension {
            RiskDimension::Syntax => &mut self.syntax,
            RiskDimension::Permission => &mut self.permission,
            RiskDimension::CostPerformance => &mut self.cost_performance,
        };
        *slot = (*slot + amount).clamp(0.0, 1.0);
    }

    pub fn from_model(risks: &RiskVector) -> Self {
        Self {
            syntax: risks.syntax,
            permission: risks.permission,
            cost_performance: risks.cost_performance,
        }
    }

    pub fn dominant(&self) -> RiskDimension {
        let mut best = RiskDimension::Syntax;
        for dimension in RiskDimension::ALL {
            if self.get(dimension) > self.get(best) {
                best = dimension;
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Used,
    Unavailable,
    TimedOut,
    Failed,
    Refused,
}

/// Whether one input to the synthesis contributed, and why not if it didn't.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub source: String,
    pub status: SignalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Signal {
    pub fn used(source: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            source: source.into(),
            status: SignalStatus::Used,
            value,
            detail: None,
        }
    }

    pub fn missing(source: impl Into<String>, status: SignalStatus, detail: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status,
            value: None,
            detail: Some(detail.into()),
        }
    }

    pub fn is_used(&self) -> bool {
        self.status == SignalStatus::Used
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub success_probability: f64,
    pub confidence: f64,
    pub warnings: Vec<Warning>,
    pub suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    pub explanation: String,
    pub risk_breakdown: RiskBreakdown,
    pub signals: Vec<Signal>,
    pub context_flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_validation() {
        assert!(validate_tool("query-exec").is_ok());
        assert!(validate_tool("").is_err());
        assert!(validate_tool("   ").is_err());
        assert!(validate_tool("bad\u{0007}tool").is_err());
        assert!(validate_tool(&"t".repeat(MAX_TOOL_NAME_LEN)).is_ok());
        assert!(validate_tool(&"t".repeat(MAX_TOOL_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_params_normalization() {
        assert_eq!(normalize_params(Value::Null).unwrap(), json!({}));
        assert_eq!(normalize_params(json!({"a": 1})).unwrap(), json!({"a": 1}));
        let err = normalize_params(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("Syntax error near FROM"), Some(RiskDimension::Syntax));
        assert_eq!(classify_error("permission denied for table"), Some(RiskDimension::Permission));
        assert_eq!(classify_error("401 Unauthorized"), Some(RiskDimension::Permission));
        assert_eq!(classify_error("timeout"), Some(RiskDimension::CostPerformance));
        assert_eq!(classify_error("Quota exceeded"), Some(RiskDimension::CostPerformance));
        assert_eq!(classify_error("something odd"), None);
    }

    #[test]
    fn test_breakdown_dominant() {
        let mut breakdown = RiskBreakdown::default();
        assert_eq!(breakdown.dominant(), RiskDimension::Syntax);
        breakdown.add(RiskDimension::CostPerformance, 0.8);
        breakdown.add(RiskDimension::Permission, 0.3);
        assert_eq!(breakdown.dominant(), RiskDimension::CostPerformance);
        breakdown.add(RiskDimension::CostPerformance, 5.0);
        assert_eq!(breakdown.cost_performance, 1.0);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = PredictionResult {
            success_probability: 0.5,
            confidence: 0.0,
            warnings: vec![],
            suggestions: vec![],
            estimated_cost: None,
            estimated_duration_ms: Some(12),
            explanation: String::new(),
            risk_breakdown: RiskBreakdown::default(),
            signals: vec![],
            context_flags: vec![],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["successProbability"], 0.5);
        assert_eq!(json["estimatedDurationMs"], 12);
        assert!(json.get("estimatedCost").is_none());
    }
}
