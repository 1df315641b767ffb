//! Load generator errors.

use fnb_core::error::ValidationError;
use fnb_router::RouterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadGenError {
    #[error("Generated an invalid transaction: {0}")]
    Validation(#[from] ValidationError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] RouterError),
}
