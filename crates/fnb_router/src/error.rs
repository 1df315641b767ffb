//! Router error types.

use fnb_core::transaction::TransactionType;
use thiserror::Error;

use crate::state::FlowState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Invalid flow state transition: {from} -> {to}")]
    InvalidTransition { from: FlowState, to: FlowState },

    #[error("Invalid flow definition {flow}: {message}")]
    InvalidFlow { flow: String, message: String },

    #[error("No flow registered for transaction type {0}")]
    UnknownFlow(TransactionType),

    #[error("Admission is closed")]
    AdmissionClosed,
}

impl RouterError {
    pub fn invalid_flow(flow: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFlow {
            flow: flow.into(),
            message: message.into(),
        }
    }
}
