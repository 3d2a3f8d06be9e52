// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Numeric Predictor
//!
//! A fixed 10 → 16 (tanh) → 4 (sigmoid) feed-forward network. Outputs are,
//! in order: success probability, syntax risk, permission risk and
//! cost/performance risk.
//!
//! Weights live in an immutable [`NetworkWeights`] buffer behind an `Arc`.
//! Training clones the buffer, updates the clone and swaps the pointer, so an
//! inference always sees one consistent set of weights. Training steps are
//! serialized by a separate mutex.
//!
//! Initialization is deterministic: sinusoidal hidden weights and a zero
//! output layer, so an untrained network answers exactly 0.5 on every head.

use crate::domain::features::{FeatureVector, FEATURE_COUNT};
use crate::domain::pattern::confidence;
use crate::domain::prediction::RiskDimension;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const INPUT: usize = FEATURE_COUNT;
pub const HIDDEN: usize = 16;
pub const OUTPUT: usize = 4;

/// Training steps after which the model's own evidence saturates.
pub const MODEL_EVIDENCE_SATURATION: f64 = 50.0;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Inference exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    #[error("Invalid feature vector: {0}")]
    InvalidFeatures(String),

    #[error("Inference failed: {0}")]
    Failed(String),
}

/// Output of one inference, each component in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskVector {
    pub success: f64,
    pub syntax: f64,
    pub permission: f64,
    pub cost_performance: f64,
}

impl RiskVector {
    pub fn from_array(values: [f64; OUTPUT]) -> Self {
        Self {
            success: values[0],
            syntax: values[1],
            permission: values[2],
            cost_performance: values[3],
        }
    }

    pub fn to_array(&self) -> [f64; OUTPUT] {
        [self.success, self.syntax, self.permission, self.cost_performance]
    }

    pub fn risk(&self, dimension: RiskDimension) -> f64 {
        match dimension {
            RiskDimension::Syntax => self.syntax,
            RiskDimension::Permission => self.permission,
            RiskDimension::CostPerformance => self.cost_performance,
        }
    }

    /// Highest risk head. Ties resolve in `RiskDimension::ALL` order.
    pub fn dominant_risk(&self) -> (RiskDimension, f64) {
        RiskDimension::ALL
            .iter()
            .map(|d| (*d, self.risk(*d)))
            .fold((RiskDimension::Syntax, f64::MIN), |best, next| {
                if next.1 > best.1 {
                    next
                } else {
                    best
                }
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub w1: [[f64; INPUT]; HIDDEN],
    pub b1: [f64; HIDDEN],
    pub w2: [[f64; HIDDEN]; OUTPUT],
    pub b2: [f64; OUTPUT],
}

impl Default for NetworkWeights {
    fn default() -> Self {
        let scale = (2.0 / INPUT as f64).sqrt();
        let mut w1 = [[0.0; INPUT]; HIDDEN];
        for (j, row) in w1.iter_mut().enumerate() {
            for (i, w) in row.iter_mut().enumerate() {
                *w = (((j + 1) * (i + 1)) as f64 * 0.7).sin() * scale;
            }
        }
        Self {
            w1,
            b1: [0.0; HIDDEN],
            w2: [[0.0; HIDDEN]; OUTPUT],
            b2: [0.0; OUTPUT],
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl NetworkWeights {
    fn hidden(&self, x: &FeatureVector) -> [f64; HIDDEN] {
        let mut h = [0.0; HIDDEN];
        for (j, out) in h.iter_mut().enumerate() {
            let z: f64 = self.b1[j] + self.w1[j].iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
            *out = z.tanh();
        }
        h
    }

    fn output(&self, h: &[f64; HIDDEN]) -> [f64; OUTPUT] {
        let mut o = [0.0; OUTPUT];
        for (k, out) in o.iter_mut().enumerate() {
            let z: f64 = self.b2[k] + self.w2[k].iter().zip(h).map(|(w, v)| w * v).sum::<f64>();
            *out = sigmoid(z);
        }
        o
    }

    pub fn forward(&self, x: &FeatureVector) -> [f64; OUTPUT] {
        self.output(&self.hidden(x))
    }

    /// One MSE gradient step. Returns the loss before the update.
    fn step(&self, x: &FeatureVector, target: &[f64; OUTPUT], learning_rate: f64) -> (Self, f64) {
        let h = self.hidden(x);
        let o = self.output(&h);

        let loss = o
            .iter()
            .zip(target)
            .map(|(o, t)| (o - t).powi(2))
            .sum::<f64>()
            / OUTPUT as f64;

        let mut dz2 = [0.0; OUTPUT];
        for k in 0..OUTPUT {
            dz2[k] = 2.0 * (o[k] - target[k]) / OUTPUT as f64 * o[k] * (1.0 - o[k]);
        }

        let mut dz1 = [0.0; HIDDEN];
        for j in 0..HIDDEN {
            let dh: f64 = (0..OUTPUT).map(|k| self.w2[k][j] * dz2[k]).sum();
            dz1[j] = dh * (1.0 - h[j] * h[j]);
        }

        let mut next = self.clone();
        for k in 0..OUTPUT {
            for j in 0..HIDDEN {
                next.w2[k][j] -= learning_rate * dz2[k] * h[j];
            }
            next.b2[k] -= learning_rate * dz2[k];
        }
        for j in 0..HIDDEN {
            for i in 0..INPUT {
                next.w1[j][i] -= learning_rate * dz1[j] * x[i];
            }
            next.b1[j] -= learning_rate * dz1[j];
        }
        (next, loss)
    }

    fn is_finite(&self) -> bool {
        self.w1.iter().flatten().all(|w| w.is_finite())
            && self.b1.iter().all(|w| w.is_finite())
            && self.w2.iter().flatten().all(|w| w.is_finite())
            && self.b2.iter().all(|w| w.is_finite())
    }
}

fn validate(features: &FeatureVector) -> Result<(), InferenceError> {
    match features.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(InferenceError::InvalidFeatures(format!(
            "feature {i} is not finite"
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub layers: [usize; 3],
    pub parameters: usize,
    pub training_steps: u64,
    pub evidence: f64,
}

/// Inference seam used by the synthesizer and the learning path.
#[async_trait]
pub trait RiskModel: Send + Sync {
    async fn infer(&self, features: &FeatureVector) -> Result<RiskVector, InferenceError>;

    /// One online update. Returns the loss measured before the update.
    async fn train(
        &self,
        features: &FeatureVector,
        target: &RiskVector,
        learning_rate: f64,
    ) -> Result<f64, InferenceError>;

    /// How much the model's own output should be trusted, in `[0, 1]`.
    fn evidence(&self) -> f64;

    fn info(&self) -> ModelInfo;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    training_steps: u64,
    weights: NetworkWeights,
}

pub struct NeuralPredictor {
    weights: RwLock<Arc<NetworkWeights>>,
    training: Mutex<()>,
    training_steps: AtomicU64,
}

impl Default for NeuralPredictor {
    fn default() -> Self {
        Self::new()
    }
}

impl NeuralPredictor {
    pub fn new() -> Self {
        Self::from_weights(NetworkWeights::default(), 0)
    }

    pub fn from_weights(weights: NetworkWeights, training_steps: u64) -> Self {
        Self {
            weights: RwLock::new(Arc::new(weights)),
            training: Mutex::new(()),
            training_steps: AtomicU64::new(training_steps),
        }
    }

    /// Current weight buffer. Later training does not affect the returned value.
    pub fn weights(&self) -> Arc<NetworkWeights> {
        self.weights.read().clone()
    }

    pub fn training_steps(&self) -> u64 {
        self.training_steps.load(Ordering::Acquire)
    }

    pub fn infer_now(&self, features: &FeatureVector) -> Result<RiskVector, InferenceError> {
        validate(features)?;
        let output = self.weights().forward(features);
        if output.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::Failed("non-finite network output".to_string()));
        }
        Ok(RiskVector::from_array(output))
    }

    pub fn train_step(
        &self,
        features: &FeatureVector,
        target: &RiskVector,
        learning_rate: f64,
    ) -> Result<f64, InferenceError> {
        validate(features)?;
        let target = target.to_array();
        if target.iter().any(|t| !t.is_finite() || !(0.0..=1.0).contains(t)) {
            return Err(InferenceError::InvalidFeatures(
                "training target outside [0, 1]".to_string(),
            ));
        }

        let _guard = self.training.lock();
        let current = self.weights();
        let (next, loss) = current.step(features, &target, learning_rate);
        if !next.is_finite() {
            return Err(InferenceError::Failed("training diverged".to_string()));
        }
        *self.weights.write() = Arc::new(next);
        self.training_steps.fetch_add(1, Ordering::AcqRel);
        Ok(loss)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            training_steps: self.training_steps(),
            weights: (*self.weights()).clone(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model snapshot {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Invalid model snapshot {}", path.display()))?;
        if !snapshot.weights.is_finite() {
            anyhow::bail!("Model snapshot {} contains non-finite weights", path.display());
        }
        Ok(Self::from_weights(snapshot.weights, snapshot.training_steps))
    }

    /// Load `path` when it exists, otherwise start untrained.
    pub fn load_or_new(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let model = Self::load(path)?;
                tracing::info!(
                    path = %path.display(),
                    training_steps = model.training_steps(),
                    "Loaded model snapshot"
                );
                Ok(model)
            }
            _ => Ok(Self::new()),
        }
    }
}

#[async_trait]
impl RiskModel for NeuralPredictor {
    async fn infer(&self, features: &FeatureVector) -> Result<RiskVector, InferenceError> {
        self.infer_now(features)
    }

    async fn train(
        &self,
        features: &FeatureVector,
        target: &RiskVector,
        learning_rate: f64,
    ) -> Result<f64, InferenceError> {
        self.train_step(features, target, learning_rate)
    }

    fn evidence(&self) -> f64 {
        confidence(self.training_steps(), MODEL_EVIDENCE_SATURATION)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            layers: [INPUT, HIDDEN, OUTPUT],
            parameters: INPUT * HIDDEN + HIDDEN + HIDDEN * OUTPUT + OUTPUT,
            training_steps: self.training_steps(),
            evidence: self.evidence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FEATURES: FeatureVector = [0.2, 0.8, 0.0, 0.3, 1.0, 0.0, 1.0, 0.0, 0.4, 0.05];

    fn failure_target() -> RiskVector {
        RiskVector {
            success: 0.0,
            syntax: 0.0,
            permission: 0.0,
            cost_performance: 1.0,
        }
    }

    #[test]
    fn test_untrained_model_is_neutral() {
        let model = NeuralPredictor::new();
        let out = model.infer_now(&FEATURES).unwrap();
        assert_eq!(out.to_array(), [0.5; OUTPUT]);
        assert_eq!(model.evidence(), 0.0);
    }

    #[test]
    fn test_non_finite_features_are_rejected() {
        let model = NeuralPredictor::new();
        let mut bad = FEATURES;
        bad[3] = f64::NAN;
        assert!(matches!(
            model.infer_now(&bad),
            Err(InferenceError::InvalidFeatures(_))
        ));
        bad[3] = f64::INFINITY;
        assert!(model.train_step(&bad, &failure_target(), 0.05).is_err());
        assert_eq!(model.training_steps(), 0);
    }

    #[test]
    fn test_training_reduces_loss_and_moves_success_head() {
        let model = NeuralPredictor::new();
        let first = model.train_step(&FEATURES, &failure_target(), 0.5).unwrap();
        let mut last = first;
        let mut previous_success = model.infer_now(&FEATURES).unwrap().success;
        for _ in 0..50 {
            last = model.train_step(&FEATURES, &failure_target(), 0.5).unwrap();
            let success = model.infer_now(&FEATURES).unwrap().success;
            assert!(success <= previous_success + 1e-12);
            previous_success = success;
        }

        assert!(last < first);
        let out = model.infer_now(&FEATURES).unwrap();
        assert!(out.success < 0.5);
        assert!(out.cost_performance > 0.5);
        assert_eq!(out.dominant_risk().0, RiskDimension::CostPerformance);
        assert_eq!(model.training_steps(), 51);
        assert_eq!(model.evidence(), 1.0);
    }

    #[test]
    fn test_readers_keep_their_weight_snapshot() {
        let model = NeuralPredictor::new();
        let before = model.weights();
        model.train_step(&FEATURES, &failure_target(), 0.5).unwrap();
        assert_eq!(*before, NetworkWeights::default());
        assert_ne!(*model.weights(), NetworkWeights::default());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("weights.json");
        let model = NeuralPredictor::new();
        for _ in 0..3 {
            model.train_step(&FEATURES, &failure_target(), 0.2).unwrap();
        }
        model.save(&path).unwrap();

        let restored = NeuralPredictor::load(&path).unwrap();
        assert_eq!(restored.training_steps(), 3);
        assert_eq!(
            restored.infer_now(&FEATURES).unwrap(),
            model.infer_now(&FEATURES).unwrap()
        );

        let missing = dir.path().join("absent.json");
        assert_eq!(NeuralPredictor::load_or_new(Some(missing.as_path())).unwrap().training_steps(), 0);
    }

    fn arbitrary_weights() -> impl Strategy<Value = NetworkWeights> {
        (
            prop::collection::vec(-5.0f64..5.0, INPUT * HIDDEN),
            prop::collection::vec(-5.0f64..5.0, HIDDEN * OUTPUT + HIDDEN + OUTPUT),
        )
            .prop_map(|(first, rest)| {
                let mut weights = NetworkWeights::default();
                for (n, w) in first.into_iter().enumerate() {
                    weights.w1[n / INPUT][n % INPUT] = w;
                }
                let mut rest = rest.into_iter();
                for row in weights.w2.iter_mut() {
                    for w in row.iter_mut() {
                        *w = rest.next().unwrap_or(0.0);
                    }
                }
                for b in weights.b1.iter_mut().chain(weights.b2.iter_mut()) {
                    *b = rest.next().unwrap_or(0.0);
                }
                weights
            })
    }

    proptest! {
        #[test]
        fn prop_inference_stays_in_unit_interval(
            features in prop::array::uniform10(-1.0e6f64..1.0e6),
            weights in arbitrary_weights(),
        ) {
            let model = NeuralPredictor::from_weights(weights, 0);
            let out = model.infer_now(&features).unwrap();
            for v in out.to_array() {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
