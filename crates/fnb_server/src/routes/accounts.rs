//! Account opening endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use fnb_core::transaction::{AccountOpenRequest, TransactionPayload, TransactionType};

use super::{flow, AppState};
use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new().route("/accounts/open", post(open_account_handler))
}

/// POST /accounts/open - KYC screening, CRM profile and ledger account
async fn open_account_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<AccountOpenRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = TransactionPayload::AccountOpen(body?.0);
    let executed = flow::execute(&state, &headers, TransactionType::AccountOpen, payload).await?;
    Ok(executed.into_response())
}
