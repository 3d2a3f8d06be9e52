// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Thin axum surface over [`AugurEngine`]. Handlers translate JSON bodies into
//! engine calls and engine errors into status codes; nothing else.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::application::engine::{AnalyzeError, AugurEngine};
use crate::domain::pattern::PatternType;
use crate::domain::prediction::{AnalyzeRequest, LearnRequest, PredictionError, PredictionRequest};
use augur_swarm::SwarmError;

const DEFAULT_PATTERN_LIMIT: usize = 20;
const MAX_PATTERN_LIMIT: usize = 500;

pub struct AppState {
    pub engine: Arc<AugurEngine>,
}

pub fn app(engine: Arc<AugurEngine>) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .route("/api/learn", post(learn))
        .route("/api/analyze", post(analyze))
        .route("/api/stats", get(stats))
        .route("/api/patterns", get(patterns))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn prediction_error_status(err: &PredictionError) -> StatusCode {
    match err {
        PredictionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PredictionError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn swarm_error_status(err: &SwarmError) -> StatusCode {
    match err {
        SwarmError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SwarmError::WorkerExpired { .. } => StatusCode::GATEWAY_TIMEOUT,
        SwarmError::WorkerFailed { .. } | SwarmError::InvalidTransition { .. } => StatusCode::BAD_GATEWAY,
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn predict(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PredictionRequest>,
) -> Response {
    match state.engine.predict(payload).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(prediction_error_status(&e), e.to_string()),
    }
}

async fn learn(State(state): State<Arc<AppState>>, Json(payload): Json<LearnRequest>) -> StatusCode {
    state.engine.learn(payload);
    StatusCode::ACCEPTED
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Response {
    match state.engine.analyze(payload).await {
        Ok(output) => Json(output).into_response(),
        Err(AnalyzeError::Invalid(e)) => error_response(prediction_error_status(&e), e.to_string()),
        Err(AnalyzeError::Worker(e)) => error_response(swarm_error_status(&e), e.to_string()),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.stats().await)
}

#[derive(Debug, Deserialize)]
pub struct PatternQuery {
    #[serde(rename = "type")]
    pub pattern_type: String,
    pub limit: Option<usize>,
}

async fn patterns(State(state): State<Arc<AppState>>, Query(query): Query<PatternQuery>) -> Response {
    let pattern_type = match query.pattern_type.parse::<PatternType>() {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let limit = query.limit.unwrap_or(DEFAULT_PATTERN_LIMIT).min(MAX_PATTERN_LIMIT);

    match state.engine.learned_patterns(pattern_type, limit).await {
        Ok(patterns) => Json(patterns).into_response(),
        Err(e) => {
            warn!(error = %e, "Learned pattern query failed");
            let status = if e.is_transient() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(status, e.to_string())
        }
    }
}
