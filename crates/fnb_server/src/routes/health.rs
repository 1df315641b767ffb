//! Health check and monitoring endpoints
//!
//! Provides health, readiness, and metrics endpoints for load balancer
//! integration and service availability monitoring.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "UP" while the process serves requests
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    pub environment: String,
    pub loadgen_enabled: bool,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// True while the router has a free slot
    pub ready: bool,
    pub in_flight: usize,
    pub capacity: usize,
}

/// Build the health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
}

/// GET /health - Health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "UP".to_string(),
        service: "fnb-transaction-sim".to_string(),
        version: crate::VERSION.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        environment: state.config.environment.to_string(),
        loadgen_enabled: state.config.loadgen.enabled,
    };

    (StatusCode::OK, Json(response))
}

/// GET /ready - Readiness probe endpoint
///
/// Returns 503 while every in-flight slot is taken or during shutdown.
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let in_flight = state.router.in_flight();
    let capacity = state.router.capacity();
    let ready = !state.router.is_closed() && in_flight < capacity;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            in_flight,
            capacity,
        }),
    )
}

/// GET /metrics - Prometheus text exposition
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
