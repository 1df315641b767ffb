//! Request and result types shared by every simulator.

use std::fmt;

use fnb_core::span::Attributes;
use fnb_core::trace::TraceContext;
use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// A call from the integration layer into a backend.
///
/// The caller's span travels only as the propagated header; the simulator
/// derives its own server-side context from it.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// Flow step issuing the call
    pub step: String,
    pub capability: Capability,
    pub correlation_id: String,
    /// Propagated `b3` header of the calling span
    pub trace_header: String,
    /// Business inputs such as `account.id` or `transaction.amount`
    pub fields: Attributes,
}

impl BackendRequest {
    pub fn new(
        step: impl Into<String>,
        capability: Capability,
        correlation_id: impl Into<String>,
        trace_header: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            capability,
            correlation_id: correlation_id.into(),
            trace_header: trace_header.into(),
            fields: Attributes::new(),
        }
    }

    /// Attach business inputs.
    pub fn with_fields(mut self, fields: Attributes) -> Self {
        self.fields = fields;
        self
    }
}

/// Outcome class of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ok,
    Fault,
    Rejected,
}

/// Kind of injected or observed fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// Query blocked on table lock contention
    SlowQuery,
    /// At least one notification channel failed
    DeliveryFailure,
    /// The caller stopped waiting
    Timeout,
    /// The backend could not serve the call at all
    Unavailable,
    /// The owning transaction was cancelled
    Cancelled,
}

impl FaultKind {
    /// Faults that can never be treated as data by a blocking step.
    ///
    /// Timeouts are classified by the caller, since a timed-out branch is
    /// recoverable while a timed-out sequential step is not.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, FaultKind::Unavailable | FaultKind::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::SlowQuery => "slow-query",
            FaultKind::DeliveryFailure => "delivery-failure",
            FaultKind::Timeout => "timeout",
            FaultKind::Unavailable => "unavailable",
            FaultKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one backend invocation.
///
/// Faults are data here. Whether a fault changes the transaction outcome is
/// decided by the flow that issued the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendCallResult {
    pub step: String,
    pub capability: Capability,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultKind>,
    pub latency_ms: u64,
    pub attributes: Attributes,
    /// Server-side context of the hop
    pub context: TraceContext,
}

impl BackendCallResult {
    /// Successful call
    pub fn ok(
        step: impl Into<String>,
        capability: Capability,
        context: TraceContext,
        latency_ms: u64,
    ) -> Self {
        Self {
            step: step.into(),
            capability,
            status: CallStatus::Ok,
            fault: None,
            latency_ms,
            attributes: Attributes::new(),
            context,
        }
    }

    /// Replace the attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Mark the call as faulted.
    pub fn with_fault(mut self, fault: FaultKind) -> Self {
        self.status = CallStatus::Fault;
        self.fault = Some(fault);
        self
    }

    /// Mark the call as a business rejection.
    pub fn rejected(mut self) -> Self {
        self.status = CallStatus::Rejected;
        self
    }

    /// Convert into a timeout seen by a caller that waited `budget_ms`.
    ///
    /// The backend's own attributes are kept; the simulated latency it would
    /// have taken is recorded as `timeout.backend_ms`.
    pub fn into_timeout(mut self, budget_ms: u64) -> Self {
        self.attributes
            .set("timeout.budget_ms", budget_ms)
            .set("timeout.backend_ms", self.latency_ms);
        self.latency_ms = budget_ms;
        self.status = CallStatus::Fault;
        self.fault = Some(FaultKind::Timeout);
        self
    }

    /// Convert into a call abandoned because its transaction was cancelled.
    ///
    /// Nothing the backend produced reaches the caller, so its attributes
    /// are dropped and no simulated time is charged.
    pub fn into_cancelled(mut self) -> Self {
        self.attributes = Attributes::new().with("cancelled.backend_ms", self.latency_ms);
        self.latency_ms = 0;
        self.status = CallStatus::Fault;
        self.fault = Some(FaultKind::Cancelled);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == CallStatus::Ok
    }

    pub fn is_rejected(&self) -> bool {
        self.status == CallStatus::Rejected
    }

    pub fn is_fault(&self) -> bool {
        self.status == CallStatus::Fault
    }
}
