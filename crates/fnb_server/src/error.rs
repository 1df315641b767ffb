//! API error responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use fnb_core::ValidationError;
use fnb_router::RouterError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Errors a handler can return before a flow produces a result.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be read as the expected payload
    #[error("Malformed request: {0}")]
    BadRequest(String),

    /// The payload was readable but not acceptable
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The router is full and configured to refuse rather than queue
    #[error("Transaction capacity exhausted, retry later")]
    Overloaded,

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Overloaded | ApiError::Router(RouterError::AdmissionClosed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Router(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_error",
            ApiError::Overloaded => "overloaded",
            ApiError::Router(RouterError::AdmissionClosed) => "shutting_down",
            ApiError::Router(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request refused");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnb_core::transaction::TransactionType;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(ValidationError::MissingField("amount")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Overloaded.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(RouterError::AdmissionClosed).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(RouterError::UnknownFlow(TransactionType::Wire)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError::from(ValidationError::invalid("amount", "must be positive"))
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.error, "validation_error");
        assert_eq!(parsed.message, "Invalid value for amount: must be positive");
    }
}
