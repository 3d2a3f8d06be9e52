// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime Configuration
//!
//! `augur-config.yaml` is deserialized into [`AugurConfig`]. Every field has a
//! default, so an empty file (or no file) yields a working development setup
//! with an in-memory store.
//!
//! ```yaml
//! storage:
//!   backend: sqlite
//!   database_url: sqlite://augur.db
//! synthesis:
//!   request_deadline: 50ms
//!   weights: { historical: 0.6, neural: 0.3, context: 0.1 }
//! pool:
//!   pool_size_per_capability: 3
//!   max_concurrent_workers: 10
//! ```
//!
//! Load order: explicit path, then `AUGUR_CONFIG_PATH`, then
//! `./augur-config.yaml`, then defaults. Environment overrides are applied
//! last.

use augur_swarm::PoolConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AugurConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub synthesis: SynthesisConfig,
    pub pool: PoolConfig,
    pub learning: LearningConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    InMemory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub max_connections: u32,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
    /// Newest records per tool examined by a similarity lookup.
    pub similar_scan_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::InMemory,
            database_url: "sqlite://augur.db".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(2),
            similar_scan_limit: crate::domain::repository::DEFAULT_SIMILAR_SCAN,
        }
    }
}

/// Relative weight of each signal in the final probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub historical: f64,
    pub neural: f64,
    pub context: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            historical: 0.6,
            neural: 0.3,
            context: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub weights: SignalWeights,
    /// Below this probability, with enough confidence, a high warning fires.
    pub high_risk_threshold: f64,
    pub high_confidence_threshold: f64,
    /// Below this probability (and above the high risk threshold) a medium warning fires.
    pub medium_risk_threshold: f64,
    #[serde(with = "humantime_serde")]
    pub request_deadline: Duration,
    #[serde(with = "humantime_serde")]
    pub inference_budget: Duration,
    /// Occurrences needed for full historical confidence.
    pub confidence_saturation: f64,
    pub auth_token_ttl_minutes: f64,
    pub hour_window: u8,
    pub similar_limit: usize,
    pub suggestion_limit: usize,
    /// Records examined by the context, error and performance analyzers.
    pub analysis_window: usize,
    pub context_risk_weight: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            high_risk_threshold: 0.3,
            high_confidence_threshold: 0.7,
            medium_risk_threshold: 0.5,
            request_deadline: Duration::from_millis(50),
            inference_budget: Duration::from_millis(5),
            confidence_saturation: crate::domain::pattern::DEFAULT_CONFIDENCE_SATURATION,
            auth_token_ttl_minutes: 60.0,
            hour_window: 1,
            similar_limit: 10,
            suggestion_limit: 3,
            analysis_window: 50,
            context_risk_weight: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub queue_capacity: usize,
    pub learning_rate: f64,
    pub max_store_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Where the predictor's weights are loaded from and saved to on shutdown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            learning_rate: 0.05,
            max_store_attempts: 3,
            retry_backoff: Duration::from_millis(20),
            model_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus scrape listener. Metrics are not exported when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_listen: Option<SocketAddr>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_listen: None,
        }
    }
}

impl AugurConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 1. `AUGUR_CONFIG_PATH`
    /// 2. `./augur-config.yaml`
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AUGUR_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./augur-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, falling back to defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            // Explicit path: fail if missing or invalid
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else {
            tracing::info!("No configuration file found. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AUGUR_DATABASE_URL") {
            tracing::info!("Environment override: AUGUR_DATABASE_URL");
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.database_url = url;
        }

        if let Some(val) = lookup("AUGUR_REQUEST_DEADLINE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: AUGUR_REQUEST_DEADLINE_MS={}", ms);
                    self.synthesis.request_deadline = Duration::from_millis(ms);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AUGUR_REQUEST_DEADLINE_MS: '{}'. Expected milliseconds. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("AUGUR_MAX_CONCURRENT_WORKERS") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: AUGUR_MAX_CONCURRENT_WORKERS={}", n);
                    self.pool.max_concurrent_workers = n;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for AUGUR_MAX_CONCURRENT_WORKERS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Some(path) = lookup("AUGUR_MODEL_PATH") {
            tracing::info!("Environment override: AUGUR_MODEL_PATH={}", path);
            self.learning.model_path = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let unit = |name: &str, v: f64| -> anyhow::Result<()> {
            if !(0.0..=1.0).contains(&v) {
                anyhow::bail!("{} must lie in [0, 1], got {}", name, v);
            }
            Ok(())
        };

        if self.storage.backend == StorageBackend::Sqlite && self.storage.database_url.is_empty() {
            anyhow::bail!("storage.database_url cannot be empty for the sqlite backend");
        }
        if self.storage.max_connections == 0 {
            anyhow::bail!("storage.max_connections must be at least 1");
        }
        if self.storage.similar_scan_limit == 0 {
            anyhow::bail!("storage.similar_scan_limit must be at least 1");
        }

        let s = &self.synthesis;
        let w = s.weights;
        for (name, weight) in [
            ("historical", w.historical),
            ("neural", w.neural),
            ("context", w.context),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                anyhow::bail!("synthesis.weights.{} must be a non-negative number", name);
            }
        }
        if w.historical + w.neural + w.context <= 0.0 {
            anyhow::bail!("synthesis.weights must not all be zero");
        }
        unit("synthesis.high_risk_threshold", s.high_risk_threshold)?;
        unit("synthesis.high_confidence_threshold", s.high_confidence_threshold)?;
        unit("synthesis.medium_risk_threshold", s.medium_risk_threshold)?;
        unit("synthesis.context_risk_weight", s.context_risk_weight)?;
        if s.high_risk_threshold > s.medium_risk_threshold {
            anyhow::bail!("synthesis.high_risk_threshold cannot exceed synthesis.medium_risk_threshold");
        }
        if s.request_deadline.is_zero() {
            anyhow::bail!("synthesis.request_deadline must be greater than zero");
        }
        if s.inference_budget.is_zero() || s.inference_budget > s.request_deadline {
            anyhow::bail!("synthesis.inference_budget must be positive and within request_deadline");
        }
        if !s.confidence_saturation.is_finite() || s.confidence_saturation <= 0.0 {
            anyhow::bail!("synthesis.confidence_saturation must be positive");
        }
        if !s.auth_token_ttl_minutes.is_finite() || s.auth_token_ttl_minutes <= 0.0 {
            anyhow::bail!("synthesis.auth_token_ttl_minutes must be positive");
        }
        if s.hour_window > 12 {
            anyhow::bail!("synthesis.hour_window cannot exceed 12");
        }

        self.pool.validate().map_err(|e| anyhow::anyhow!(e))?;

        let l = &self.learning;
        if l.queue_capacity == 0 {
            anyhow::bail!("learning.queue_capacity must be at least 1");
        }
        if !(l.learning_rate > 0.0 && l.learning_rate.is_finite()) {
            anyhow::bail!("learning.learning_rate must be a positive number");
        }
        if l.max_store_attempts == 0 {
            anyhow::bail!("learning.max_store_attempts must be at least 1");
        }

        Ok(())
    }
}
