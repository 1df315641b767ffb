//! The five backend simulators.
//!
//! The set is closed: [`BackendSimulator`] is an enum over the concrete
//! simulators rather than an open trait object registry.

pub mod fraud;
pub mod ledger;
pub mod notification;
pub mod profile;
pub mod screening;

use fnb_core::rng::SimRng;
use fnb_core::trace::TraceContext;

use crate::call::{BackendCallResult, BackendRequest};
use crate::capability::{Backend, Capability};
use crate::error::BackendError;
use crate::stats::SimulatorStats;

pub use fraud::FraudSimulator;
pub use ledger::LedgerSimulator;
pub use notification::{Channel, NotificationSimulator};
pub use profile::ProfileSimulator;
pub use screening::ScreeningSimulator;

/// Any one of the backend simulators.
#[derive(Debug)]
pub enum BackendSimulator {
    Ledger(LedgerSimulator),
    Fraud(FraudSimulator),
    Screening(ScreeningSimulator),
    Profile(ProfileSimulator),
    Notification(NotificationSimulator),
}

impl BackendSimulator {
    pub fn backend(&self) -> Backend {
        match self {
            BackendSimulator::Ledger(_) => Backend::Ledger,
            BackendSimulator::Fraud(_) => Backend::Fraud,
            BackendSimulator::Screening(_) => Backend::Screening,
            BackendSimulator::Profile(_) => Backend::Profile,
            BackendSimulator::Notification(_) => Backend::Notification,
        }
    }

    /// Serve one call.
    ///
    /// Safe to call concurrently; the only shared state is the atomic
    /// counters behind [`BackendSimulator::stats`].
    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        match self {
            BackendSimulator::Ledger(s) => s.invoke(request, rng),
            BackendSimulator::Fraud(s) => s.invoke(request, rng),
            BackendSimulator::Screening(s) => s.invoke(request, rng),
            BackendSimulator::Profile(s) => s.invoke(request, rng),
            BackendSimulator::Notification(s) => s.invoke(request, rng),
        }
    }

    pub fn stats(&self) -> &SimulatorStats {
        match self {
            BackendSimulator::Ledger(s) => s.stats(),
            BackendSimulator::Fraud(s) => s.stats(),
            BackendSimulator::Screening(s) => s.stats(),
            BackendSimulator::Profile(s) => s.stats(),
            BackendSimulator::Notification(s) => s.stats(),
        }
    }
}

pub(crate) fn ensure_owned(backend: Backend, capability: Capability) -> Result<(), BackendError> {
    if capability.backend() == backend {
        Ok(())
    } else {
        Err(BackendError::UnsupportedCapability {
            backend,
            capability,
        })
    }
}

pub(crate) fn server_context(request: &BackendRequest) -> Result<TraceContext, BackendError> {
    Ok(TraceContext::extract(&request.trace_header)?)
}
