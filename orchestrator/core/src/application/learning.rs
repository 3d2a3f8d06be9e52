// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Learning Service
//!
//! Asynchronous write path for observed tool outcomes. Callers enqueue a
//! [`LearnRequest`] and return immediately; a single background task then
//!
//! 1. appends the `CommandPattern` (retrying transient store failures with
//!    exponential backoff),
//! 2. folds it into its success/failure, timing and sequence `LearnedPattern`s,
//! 3. runs one online training step on the risk model.
//!
//! Failures are logged and counted, never returned to the caller.

use crate::domain::config::LearningConfig;
use crate::domain::features::FeatureExtractor;
use crate::domain::neural::{RiskModel, RiskVector};
use crate::domain::pattern::{CommandPattern, LearnedPattern, NewCommandPattern};
use crate::domain::prediction::{classify_error, normalize_params, validate_tool, LearnRequest, RiskDimension};
use crate::domain::repository::{PatternStore, StoreError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum LearnCommand {
    Learn(LearnRequest),
    Flush(oneshot::Sender<()>),
}

/// Training target for one observed outcome: success head plus the risk head
/// the error classifies into.
pub fn training_target(request: &LearnRequest) -> RiskVector {
    let success = request.outcome.is_success();
    let dimension = if success {
        None
    } else {
        request.error.as_deref().and_then(classify_error)
    };
    let hot = |d: RiskDimension| if dimension == Some(d) { 1.0 } else { 0.0 };
    RiskVector {
        success: if success { 1.0 } else { 0.0 },
        syntax: hot(RiskDimension::Syntax),
        permission: hot(RiskDimension::Permission),
        cost_performance: hot(RiskDimension::CostPerformance),
    }
}

/// Cloneable handle to the learning queue.
#[derive(Clone)]
pub struct LearningService {
    tx: mpsc::Sender<LearnCommand>,
}

impl LearningService {
    /// Create the queue and spawn its consumer. The consumer exits once every
    /// handle has been dropped and the queue is drained.
    pub fn start(
        store: Arc<dyn PatternStore>,
        model: Arc<dyn RiskModel>,
        extractor: Arc<dyn FeatureExtractor>,
        config: LearningConfig,
        confidence_saturation: f64,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = LearningWorker {
            store,
            model,
            extractor,
            config,
            confidence_saturation,
        };
        info!("Starting learning service background task");
        (Self { tx }, tokio::spawn(worker.run(rx)))
    }

    /// Enqueue one observation. Never blocks and never fails: when the queue
    /// is full the observation is dropped and counted.
    pub fn learn(&self, mut request: LearnRequest) {
        if let Err(e) = validate_tool(&request.tool) {
            warn!(error = %e, "Discarding learn request");
            metrics::counter!("augur_learn_dropped_total", "reason" => "invalid").increment(1);
            return;
        }
        request.params = match normalize_params(std::mem::take(&mut request.params)) {
            Ok(params) => params,
            Err(e) => {
                warn!(tool = %request.tool, error = %e, "Discarding learn request");
                metrics::counter!("augur_learn_dropped_total", "reason" => "invalid").increment(1);
                return;
            }
        };
        request.context = request.context.pinned();

        match self.tx.try_send(LearnCommand::Learn(request)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Learning queue full; dropping request");
                metrics::counter!("augur_learn_dropped_total", "reason" => "full").increment(1);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Learning service stopped; dropping request");
                metrics::counter!("augur_learn_dropped_total", "reason" => "closed").increment(1);
            }
        }
    }

    /// Wait until everything enqueued before this call has been processed.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(LearnCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

struct LearningWorker {
    store: Arc<dyn PatternStore>,
    model: Arc<dyn RiskModel>,
    extractor: Arc<dyn FeatureExtractor>,
    config: LearningConfig,
    confidence_saturation: f64,
}

impl LearningWorker {
    async fn run(self, mut rx: mpsc::Receiver<LearnCommand>) {
        let mut processed = 0u64;
        while let Some(command) = rx.recv().await {
            match command {
                LearnCommand::Learn(request) => {
                    self.process(request).await;
                    processed += 1;
                }
                LearnCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!(processed, "Learning service stopped");
    }

    async fn process(&self, request: LearnRequest) {
        let new_pattern = NewCommandPattern {
            tool: request.tool.clone(),
            params: request.params.clone(),
            context: request.context.clone(),
            outcome: request.outcome,
            duration_ms: request.duration_ms,
            error: request.error.clone(),
            timestamp_ms: request.context.effective_timestamp_ms(),
        };
        let mut pattern = new_pattern.clone().into_pattern();

        match self
            .with_retry("record", || self.store.record(new_pattern.clone()))
            .await
        {
            Ok(id) => {
                pattern.id = id;
                if let Err(e) = self.fold(&pattern).await {
                    error!(tool = %pattern.tool, error = %e, "Failed to fold learned patterns");
                }
            }
            Err(e) => {
                error!(tool = %request.tool, error = %e, "Failed to record command pattern");
            }
        }

        let features = self.extractor.extract(&request.tool, &request.params);
        let target = training_target(&request);
        match self
            .model
            .train(&features, &target, self.config.learning_rate)
            .await
        {
            Ok(loss) => debug!(tool = %request.tool, loss, "Risk model trained"),
            Err(e) => warn!(tool = %request.tool, error = %e, "Risk model training step failed"),
        }
    }

    async fn fold(&self, pattern: &CommandPattern) -> Result<(), StoreError> {
        let saturation = self.confidence_saturation;

        let id = LearnedPattern::outcome_id(&pattern.tool, &pattern.params_hash, pattern.outcome);
        let existing = self.with_retry("learned", || self.store.learned(id)).await?;
        let folded = LearnedPattern::fold_outcome(existing, pattern, saturation);
        self.with_retry("upsert", || self.store.upsert_learned(&folded)).await?;

        let id = LearnedPattern::timing_id(&pattern.tool, pattern.hour_of_day);
        let existing = self.with_retry("learned", || self.store.learned(id)).await?;
        let folded = LearnedPattern::fold_timing(existing, pattern, saturation);
        self.with_retry("upsert", || self.store.upsert_learned(&folded)).await?;

        if let Some(previous) = pattern.context.previous_tool() {
            let id = LearnedPattern::sequence_id(previous, &pattern.tool);
            let existing = self.with_retry("learned", || self.store.learned(id)).await?;
            if let Some(folded) = LearnedPattern::fold_sequence(existing, pattern, saturation) {
                self.with_retry("upsert", || self.store.upsert_learned(&folded)).await?;
            }
        }
        Ok(())
    }

    /// Retry transient store failures, doubling the delay each time.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.config.max_store_attempts.max(1);
        let mut delay = self.config.retry_backoff;
        let mut tries = 1;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && tries < max_attempts => {
                    metrics::counter!("augur_store_retries_total", "operation" => operation).increment(1);
                    debug!(operation, attempt = tries, error = %e, "Retrying pattern store operation");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    tries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::ToolContext;
    use crate::domain::features::HeuristicFeatureExtractor;
    use crate::domain::neural::NeuralPredictor;
    use crate::domain::pattern::{Outcome, PatternType};
    use crate::infrastructure::repositories::InMemoryPatternStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn request(tool: &str, outcome: Outcome, error: Option<&str>) -> LearnRequest {
        LearnRequest {
            tool: tool.to_string(),
            params: json!({ "query": "SELECT * FROM orders" }),
            outcome,
            duration_ms: 80,
            error: error.map(str::to_string),
            context: ToolContext {
                recent_tools: vec!["schema-read".to_string()],
                timestamp_ms: Some(1_704_103_200_000),
                ..ToolContext::default()
            },
        }
    }

    fn start(store: Arc<dyn PatternStore>, model: Arc<NeuralPredictor>, config: LearningConfig) -> (LearningService, JoinHandle<()>) {
        LearningService::start(store, model, Arc::new(HeuristicFeatureExtractor), config, 10.0)
    }

    #[test]
    fn test_training_target_marks_error_dimension() {
        let target = training_target(&request("q", Outcome::Failure, Some("permission denied")));
        assert_eq!(target.to_array(), [0.0, 0.0, 1.0, 0.0]);
        let target = training_target(&request("q", Outcome::Success, Some("timeout")));
        assert_eq!(target.to_array(), [1.0, 0.0, 0.0, 0.0]);
        let target = training_target(&request("q", Outcome::Failure, None));
        assert_eq!(target.to_array(), [0.0; 4]);
    }

    #[tokio::test]
    async fn test_learn_records_folds_and_trains() {
        let store = InMemoryPatternStore::new();
        let model = Arc::new(NeuralPredictor::new());
        let (service, _handle) = start(Arc::new(store.clone()), model.clone(), LearningConfig::default());

        service.learn(request("query-exec", Outcome::Failure, Some("timeout")));
        service.learn(request("query-exec", Outcome::Failure, Some("timeout")));
        service.flush().await;

        let aggregate = store.aggregate("query-exec").await.unwrap();
        assert_eq!(aggregate.total, 2);
        assert_eq!(model.training_steps(), 2);

        let failures = store.learned_patterns(PatternType::Failure, 10).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].occurrence_count, 2);
        assert_eq!(store.learned_patterns(PatternType::Timing, 10).await.unwrap().len(), 1);
        let sequences = store.learned_patterns(PatternType::Sequence, 10).await.unwrap();
        assert_eq!(sequences[0].payload["failures"], 2);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_dropped_silently() {
        let store = InMemoryPatternStore::new();
        let (service, _handle) = start(
            Arc::new(store.clone()),
            Arc::new(NeuralPredictor::new()),
            LearningConfig::default(),
        );

        service.learn(request("", Outcome::Success, None));
        let mut bad_params = request("query-exec", Outcome::Success, None);
        bad_params.params = json!("not an object");
        service.learn(bad_params);
        service.flush().await;

        assert_eq!(store.stats().await.unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let store = InMemoryPatternStore::new();
        let config = LearningConfig {
            queue_capacity: 1,
            ..LearningConfig::default()
        };
        let (service, _handle) = start(Arc::new(store.clone()), Arc::new(NeuralPredictor::new()), config);

        // The consumer cannot run between these calls on a current-thread
        // runtime, so only the first observation fits in the queue.
        for _ in 0..20 {
            service.learn(request("query-exec", Outcome::Success, None));
        }
        service.flush().await;
        assert_eq!(store.stats().await.unwrap().total_records, 1);

        // Once drained the queue accepts again.
        service.learn(request("query-exec", Outcome::Success, None));
        service.flush().await;
        assert_eq!(store.stats().await.unwrap().total_records, 2);
    }

    /// Fails `record` with a transient error a fixed number of times.
    struct FlakyStore {
        inner: InMemoryPatternStore,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl PatternStore for FlakyStore {
        async fn record(&self, pattern: NewCommandPattern) -> Result<Uuid, StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.record(pattern).await
        }
        async fn similar(&self, tool: &str, params: &Value, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
            self.inner.similar(tool, params, limit).await
        }
        async fn aggregate(&self, tool: &str) -> Result<crate::domain::pattern::PatternAggregate, StoreError> {
            self.inner.aggregate(tool).await
        }
        async fn time_correlated(&self, tool: &str, hour: u8, day: u8, window: u8) -> Result<crate::domain::pattern::PatternAggregate, StoreError> {
            self.inner.time_correlated(tool, hour, day, window).await
        }
        async fn recent(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
            self.inner.recent(tool, limit).await
        }
        async fn successful(&self, tool: &str, limit: usize) -> Result<Vec<CommandPattern>, StoreError> {
            self.inner.successful(tool, limit).await
        }
        async fn learned(&self, id: Uuid) -> Result<Option<LearnedPattern>, StoreError> {
            self.inner.learned(id).await
        }
        async fn upsert_learned(&self, pattern: &LearnedPattern) -> Result<(), StoreError> {
            self.inner.upsert_learned(pattern).await
        }
        async fn learned_patterns(&self, t: PatternType, limit: usize) -> Result<Vec<LearnedPattern>, StoreError> {
            self.inner.learned_patterns(t, limit).await
        }
        async fn stats(&self) -> Result<crate::domain::pattern::StoreStats, StoreError> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_transient_store_failures_are_retried() {
        let inner = InMemoryPatternStore::new();
        let flaky = Arc::new(FlakyStore {
            inner: inner.clone(),
            failures_left: AtomicU32::new(2),
        });
        let config = LearningConfig {
            max_store_attempts: 3,
            retry_backoff: Duration::from_millis(1),
            ..LearningConfig::default()
        };
        let (service, _handle) = start(flaky.clone(), Arc::new(NeuralPredictor::new()), config);

        service.learn(request("query-exec", Outcome::Success, None));
        service.flush().await;
        assert_eq!(inner.stats().await.unwrap().total_records, 1);

        // Exhausting the attempts gives up without touching the store.
        flaky.failures_left.store(5, Ordering::SeqCst);
        service.learn(request("query-exec", Outcome::Success, None));
        service.flush().await;
        assert_eq!(inner.stats().await.unwrap().total_records, 1);
    }
}
