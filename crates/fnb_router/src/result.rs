//! Flow results.

use fnb_backends::{BackendCallResult, Capability};
use fnb_core::span::SpanRecord;
use fnb_core::trace::{TraceContext, TraceId};
use fnb_core::transaction::TransactionType;
use serde::Serialize;

use crate::state::FlowOutcome;

/// Reason carried by a run stopped through cancellation.
pub const CANCELLED_REASON: &str = "cancelled";

/// Everything a finished transaction produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResult {
    pub correlation_id: String,
    pub flow_name: String,
    pub transaction_type: TransactionType,
    pub outcome: FlowOutcome,
    /// Why the flow did not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Simulated end-to-end latency
    pub total_latency_ms: u64,
    /// Backend calls in the order their results were applied
    pub calls: Vec<BackendCallResult>,
    /// Steps that never ran
    pub skipped: Vec<String>,
    pub trace_id: TraceId,
    /// Context of the hop that submitted the transaction
    #[serde(skip)]
    pub entry: TraceContext,
    /// Entry span, flow span, then every span below them
    pub spans: Vec<SpanRecord>,
}

impl FlowResult {
    /// The call made by a step
    pub fn call(&self, step: &str) -> Option<&BackendCallResult> {
        self.calls.iter().find(|c| c.step == step)
    }

    /// Whether any call invoked `capability`
    pub fn invoked(&self, capability: Capability) -> bool {
        self.calls.iter().any(|c| c.capability == capability)
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == FlowOutcome::Completed
    }

    pub fn is_rejected(&self) -> bool {
        self.outcome == FlowOutcome::Rejected
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == FlowOutcome::Failed
    }

    /// Failed because the run was cancelled rather than by a backend
    pub fn is_cancelled(&self) -> bool {
        self.is_failed() && self.reason.as_deref() == Some(CANCELLED_REASON)
    }
}
