//! Error types for the core layer.

use thiserror::Error;

use crate::transaction::TransactionType;

/// Errors raised while parsing a propagated trace header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// The header does not have the expected number of hyphen-delimited fields
    #[error("Malformed trace header: expected 3 or 4 fields, found {0}")]
    FieldCount(usize),

    /// The trace id field is not valid lowercase hex of the right width, or is all zeros
    #[error("Invalid trace id: {0:?}")]
    InvalidTraceId(String),

    /// The span id field is not 16 hex characters, or is all zeros
    #[error("Invalid span id: {0:?}")]
    InvalidSpanId(String),

    /// The sampling field is not one of the recognised flags
    #[error("Invalid sampling flag: {0:?}")]
    InvalidSampled(String),

    /// A `traceparent` header carried a version other than `00`
    #[error("Unsupported traceparent version: {0:?}")]
    UnsupportedVersion(String),
}

/// Errors raised when a transaction request fails validation.
///
/// A request that fails validation never enters a flow.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but its value is not acceptable
    #[error("Invalid value for {field}: {message}")]
    InvalidField {
        /// Wire name of the offending field
        field: &'static str,
        /// Human-readable explanation
        message: String,
    },

    /// The payload variant does not belong to the transaction type
    #[error("Payload does not match transaction type {0}")]
    PayloadMismatch(TransactionType),
}

impl ValidationError {
    /// Build an [`ValidationError::InvalidField`] from a field name and message.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_error_display() {
        let err = TraceError::FieldCount(2);
        assert_eq!(
            err.to_string(),
            "Malformed trace header: expected 3 or 4 fields, found 2"
        );

        let err = TraceError::InvalidSampled("x".to_string());
        assert!(err.to_string().contains("\"x\""));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::invalid("amount", "must be positive");
        assert_eq!(err.to_string(), "Invalid value for amount: must be positive");

        let err = ValidationError::MissingField("sourceAccount");
        assert_eq!(err.to_string(), "Missing required field: sourceAccount");

        let err = ValidationError::PayloadMismatch(TransactionType::Wire);
        assert_eq!(err.to_string(), "Payload does not match transaction type WIRE");
    }
}
