//! Payment endpoints
//!
//! Wire transfers and ACH payments both run the payment flow: fraud
//! scoring, AML screening, ledger debit and a customer notification.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use fnb_core::transaction::{PaymentRequest, TransactionPayload, TransactionType};

use super::{flow, AppState};
use crate::error::ApiError;

/// Build the payment routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/wire", post(wire_handler))
        .route("/payments/ach", post(ach_handler))
}

/// POST /payments/wire
async fn wire_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    submit(&state, &headers, TransactionType::Wire, body?.0).await
}

/// POST /payments/ach
async fn ach_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    submit(&state, &headers, TransactionType::Ach, body?.0).await
}

async fn submit(
    state: &AppState,
    headers: &HeaderMap,
    kind: TransactionType,
    payment: PaymentRequest,
) -> Result<Response, ApiError> {
    let executed = flow::execute(state, headers, kind, TransactionPayload::Payment(payment)).await?;
    Ok(executed.into_response())
}
