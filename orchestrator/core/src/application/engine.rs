// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Augur Engine
//!
//! Application facade wiring the pattern store, the risk model, the worker
//! pools, the synthesizer and the learning queue into the four operations the
//! presentation layer exposes: `predict`, `learn`, `analyze` and `stats`.

use crate::application::capabilities::{AnalysisTask, CapabilityOutput, StoreBackedHandler};
use crate::application::learning::LearningService;
use crate::application::repository_factory::create_pattern_store;
use crate::application::synthesizer::PredictionSynthesizer;
use crate::domain::config::AugurConfig;
use crate::domain::features::{FeatureExtractor, HeuristicFeatureExtractor};
use crate::domain::neural::{ModelInfo, NeuralPredictor, RiskModel};
use crate::domain::pattern::{LearnedPattern, PatternType, StoreStats};
use crate::domain::prediction::{
    normalize_params, validate_tool, AnalyzeRequest, LearnRequest, PredictionError,
    PredictionRequest, PredictionResult,
};
use crate::domain::repository::{PatternStore, StoreError};
use crate::infrastructure::db::Database;
use anyhow::{Context, Result};
use augur_swarm::{classify, PoolStats, SwarmError, TaskHandler, WorkerPoolCoordinator};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Invalid(#[from] PredictionError),

    #[error(transparent)]
    Worker(#[from] SwarmError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub pool: PoolStats,
    pub model: ModelInfo,
    /// `None` when the store could not be reached.
    pub store: Option<StoreStats>,
}

pub struct AugurEngine {
    config: AugurConfig,
    store: Arc<dyn PatternStore>,
    model: Arc<dyn RiskModel>,
    /// Concrete predictor, present when its weights can be snapshotted.
    predictor: Option<Arc<NeuralPredictor>>,
    coordinator: Arc<WorkerPoolCoordinator<AnalysisTask, CapabilityOutput>>,
    synthesizer: PredictionSynthesizer,
    learning: LearningService,
    learning_task: Mutex<Option<JoinHandle<()>>>,
    database: Option<Database>,
}

impl AugurEngine {
    /// Build the production engine: configured store backend, the neural
    /// predictor (restored from `learning.model_path` when present) and the
    /// heuristic feature extractor.
    pub async fn from_config(config: AugurConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let handle = create_pattern_store(&config.storage).await?;
        let predictor = Arc::new(
            NeuralPredictor::load_or_new(config.learning.model_path.as_deref())
                .context("Failed to initialize the risk model")?,
        );

        let mut engine = Self::with_components(
            config,
            handle.store,
            predictor.clone(),
            Arc::new(HeuristicFeatureExtractor),
        );
        engine.predictor = Some(predictor);
        engine.database = handle.database;
        Ok(engine)
    }

    /// Assemble an engine around caller-supplied components. Must run inside
    /// a tokio runtime: the learning queue's consumer is spawned here.
    pub fn with_components(
        config: AugurConfig,
        store: Arc<dyn PatternStore>,
        model: Arc<dyn RiskModel>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let handler: Arc<dyn TaskHandler<AnalysisTask, CapabilityOutput>> =
            Arc::new(StoreBackedHandler::new(store.clone(), config.synthesis.clone()));
        let coordinator = Arc::new(WorkerPoolCoordinator::new(handler, config.pool.clone()));
        coordinator.prewarm();

        let synthesizer = PredictionSynthesizer::new(
            store.clone(),
            model.clone(),
            extractor.clone(),
            coordinator.clone(),
            config.synthesis.clone(),
        );
        let (learning, learning_task) = LearningService::start(
            store.clone(),
            model.clone(),
            extractor,
            config.learning.clone(),
            config.synthesis.confidence_saturation,
        );

        info!(
            max_concurrent_workers = config.pool.max_concurrent_workers,
            request_deadline_ms = config.synthesis.request_deadline.as_millis() as u64,
            "Augur engine ready"
        );

        Self {
            config,
            store,
            model,
            predictor: None,
            coordinator,
            synthesizer,
            learning,
            learning_task: Mutex::new(Some(learning_task)),
            database: None,
        }
    }

    pub fn config(&self) -> &AugurConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &WorkerPoolCoordinator<AnalysisTask, CapabilityOutput> {
        &self.coordinator
    }

    pub async fn predict(&self, request: PredictionRequest) -> Result<PredictionResult, PredictionError> {
        self.synthesizer.predict(request).await
    }

    /// Fire-and-forget.
    pub fn learn(&self, request: LearnRequest) {
        self.learning.learn(request);
    }

    /// Wait for every previously enqueued learn request to be processed.
    pub async fn flush(&self) {
        self.learning.flush().await;
    }

    /// Run the single capability `request.kind` classifies to.
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<CapabilityOutput, AnalyzeError> {
        validate_tool(&request.tool)?;
        let task = AnalysisTask {
            tool: request.tool,
            params: normalize_params(request.params)?,
            context: request.context.pinned(),
        };
        let capability = classify(request.kind);
        let deadline = Instant::now() + self.config.synthesis.request_deadline;
        Ok(self.coordinator.dispatch(capability, &task, deadline).await?)
    }

    pub async fn stats(&self) -> EngineStats {
        let store = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Pattern store stats unavailable");
                None
            }
        };
        EngineStats {
            pool: self.coordinator.stats(),
            model: self.model.info(),
            store,
        }
    }

    pub async fn learned_patterns(
        &self,
        pattern_type: PatternType,
        limit: usize,
    ) -> Result<Vec<LearnedPattern>, StoreError> {
        self.store.learned_patterns(pattern_type, limit).await
    }

    /// Drain the learning queue, persist the model snapshot and close the
    /// store's pool. In-flight learn requests enqueued after this are dropped.
    pub async fn shutdown(&self) -> Result<()> {
        self.flush().await;
        let learning_task = self.learning_task.lock().take();
        if let Some(handle) = learning_task {
            handle.abort();
        }

        if let (Some(predictor), Some(path)) = (&self.predictor, &self.config.learning.model_path) {
            predictor
                .save(path)
                .with_context(|| format!("Failed to save model snapshot to {}", path.display()))?;
            info!(path = %path.display(), steps = predictor.training_steps(), "Model snapshot saved");
        }

        if let Some(database) = &self.database {
            database.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::ToolContext;
    use crate::domain::pattern::Outcome;
    use augur_swarm::TaskKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_learn_then_analyze_errors() {
        let engine = AugurEngine::from_config(AugurConfig::default()).await.unwrap();
        engine.learn(LearnRequest {
            tool: "vcs-push".to_string(),
            params: json!({ "branch": "main" }),
            outcome: Outcome::Failure,
            duration_ms: 300,
            error: Some("permission denied".to_string()),
            context: ToolContext::default(),
        });
        engine.flush().await;

        let output = engine
            .analyze(AnalyzeRequest {
                kind: TaskKind::FailureDiagnosis,
                tool: "vcs-push".to_string(),
                params: json!({ "branch": "main" }),
                context: ToolContext::default(),
            })
            .await
            .unwrap();
        let CapabilityOutput::ErrorAnalyzer(report) = output else {
            panic!("unexpected output");
        };
        assert_eq!(report.groups[0].error, "permission denied");

        let stats = engine.stats().await;
        assert_eq!(stats.store.unwrap().total_records, 1);
        assert_eq!(stats.model.training_steps, 1);
    }

    #[tokio::test]
    async fn test_analyze_rejects_invalid_input() {
        let engine = AugurEngine::from_config(AugurConfig::default()).await.unwrap();
        let err = engine
            .analyze(AnalyzeRequest {
                kind: TaskKind::GenericAnalysis,
                tool: String::new(),
                params: json!({}),
                context: ToolContext::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Invalid(PredictionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_shutdown_saves_model_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut config = AugurConfig::default();
        config.learning.model_path = Some(path.clone());

        let engine = AugurEngine::from_config(config.clone()).await.unwrap();
        engine.learn(LearnRequest {
            tool: "query-exec".to_string(),
            params: json!({ "query": "SELECT 1" }),
            outcome: Outcome::Success,
            duration_ms: 5,
            error: None,
            context: ToolContext::default(),
        });
        engine.shutdown().await.unwrap();
        assert!(path.exists());

        let restored = AugurEngine::from_config(config).await.unwrap();
        assert_eq!(restored.stats().await.model.training_steps, 1);
    }
}
