//! Errors raised by backend simulators.
//!
//! These cover calls that never reached the simulated business logic.
//! Injected faults are reported as data in a `BackendCallResult` instead.

use fnb_core::TraceError;
use thiserror::Error;

use crate::capability::{Backend, Capability};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The propagated trace header could not be read
    #[error("Trace propagation failed: {0}")]
    Propagation(#[from] TraceError),

    /// A capability was routed to a simulator that does not own it
    #[error("{backend} does not serve {capability}")]
    UnsupportedCapability {
        backend: Backend,
        capability: Capability,
    },
}
