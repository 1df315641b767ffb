//! Customer 360 endpoint

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use fnb_core::transaction::{CustomerLookup, TransactionPayload, TransactionType};

use super::{flow, AppState};
use crate::error::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new().route("/customers/{id}/360", get(customer_360_handler))
}

/// GET /customers/{id}/360
///
/// Fans out to the CRM and core banking in parallel and joins both views.
async fn customer_360_handler(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let payload = TransactionPayload::Customer360(CustomerLookup { customer_id });
    let executed = flow::execute(&state, &headers, TransactionType::Customer360, payload).await?;
    Ok(executed.into_response())
}
