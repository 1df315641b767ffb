//! Counters and demo controls

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use fnb_backends::RegistrySnapshot;
use fnb_loadgen::LoadGenSnapshot;
use fnb_router::RouterCounters;
use serde::Serialize;
use tracing::info;

use super::AppState;

/// GET /stats response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub router: RouterCounters,
    pub capacity: usize,
    pub cached_results: usize,
    pub backends: RegistrySnapshot,
    pub loadgen: LoadGenSnapshot,
}

/// POST /admin/reset response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub cancelled: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats_handler))
        .route("/admin/reset", post(reset_handler))
}

/// GET /stats - simulator counters, flow outcomes and in-flight count
async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatsResponse {
        router: state.router.counters(),
        capacity: state.router.capacity(),
        cached_results: state.router.cached_results(),
        backends: state.router.backends().snapshot(),
        loadgen: state.loadgen.snapshot(),
    };
    (StatusCode::OK, Json(response))
}

/// POST /admin/reset - cancel every in-flight transaction
async fn reset_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cancelled = state.router.cancel_all();
    info!(cancelled, "Demo reset: cancelled in-flight transactions");
    (StatusCode::OK, Json(ResetResponse { cancelled }))
}
