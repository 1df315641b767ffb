//! Trade reconciliation endpoints
//!
//! Both endpoints run the reconciliation flow on demand, outside the nightly
//! schedule. `trigger` reports the flow result; `status` reports the
//! reconciliation figures the ledger returned.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use fnb_backends::Capability;
use fnb_core::trace::TraceId;
use fnb_core::transaction::{ReconciliationTrigger, TransactionPayload, TransactionType};
use fnb_router::{FlowOutcome, FlowResult};
use serde::Serialize;

use super::{flow, AppState};
use crate::error::ApiError;

/// GET /reconciliation/status response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStatus {
    pub status: FlowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub correlation_id: String,
    pub trace_id: TraceId,
    pub last_run: DateTime<Utc>,
    pub total_positions: i64,
    pub matched: i64,
    pub breaks: i64,
    pub match_rate: f64,
}

impl ReconciliationStatus {
    fn from_result(result: &FlowResult, last_run: DateTime<Utc>) -> Self {
        let positions = result
            .calls
            .iter()
            .find(|c| c.capability == Capability::LedgerTradePositions);
        let figure = |key: &str| {
            positions
                .and_then(|c| c.attributes.get_i64(key))
                .unwrap_or(0)
        };

        Self {
            status: result.outcome,
            reason: result.reason.clone(),
            correlation_id: result.correlation_id.clone(),
            trace_id: result.trace_id,
            last_run,
            total_positions: figure("recon.positions"),
            matched: figure("recon.matched"),
            breaks: figure("recon.breaks"),
            match_rate: positions
                .and_then(|c| c.attributes.get_f64("recon.match_rate"))
                .unwrap_or(0.0),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reconciliation/trigger", post(trigger_handler))
        .route("/reconciliation/status", get(status_handler))
}

fn on_demand() -> TransactionPayload {
    TransactionPayload::Reconciliation {
        trigger: ReconciliationTrigger::OnDemand,
    }
}

/// POST /reconciliation/trigger
async fn trigger_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let executed =
        flow::execute(&state, &headers, TransactionType::ReconciliationBatch, on_demand()).await?;
    Ok(executed.into_response())
}

/// GET /reconciliation/status
async fn status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let executed =
        flow::execute(&state, &headers, TransactionType::ReconciliationBatch, on_demand()).await?;
    let status = ReconciliationStatus::from_result(&executed.result, Utc::now());
    Ok(executed.respond(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::tests::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn call(method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let router = routes().with_state(test_state());
        let response = router
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_trigger_makes_one_ledger_call() {
        let (status, body) = call("POST", "/reconciliation/trigger").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "COMPLETED");
        assert_eq!(body["calls"].as_array().unwrap().len(), 1);
        assert_eq!(body["calls"][0]["step"], "trade-positions");
    }

    #[tokio::test]
    async fn test_status_reports_figures() {
        let (status, body) = call("GET", "/reconciliation/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "COMPLETED");
        let total = body["totalPositions"].as_i64().unwrap();
        let matched = body["matched"].as_i64().unwrap();
        assert!((200..=800).contains(&total));
        assert_eq!(matched + body["breaks"].as_i64().unwrap(), total);
        assert!(body["lastRun"].is_string());
    }
}
