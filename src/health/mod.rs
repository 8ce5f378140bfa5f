//! Health check endpoints
//!
//! Mounted on the publisher gateway next to the message routes.

use crate::publisher::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Readiness check response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub nats_connected: bool,
    pub default_subject: String,
    pub timer_enabled: bool,
}

/// Health, readiness and metrics routes; state is supplied by the caller
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness endpoint - returns 200 while the broker connection is usable
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let nats_connected = state.broker.is_connected();
    state.metrics.set_nats_connected(nats_connected);

    let response = ReadyResponse {
        ready: nats_connected,
        nats_connected,
        default_subject: state.config.default_subject.clone(),
        timer_enabled: state.config.timer_enabled(),
    };

    if nats_connected {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.set_nats_connected(state.broker.is_connected());

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
