//! Running a transaction on behalf of an HTTP request.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use fnb_backends::{BackendCallResult, CallStatus, Capability, FaultKind};
use fnb_core::span::Attributes;
use fnb_core::trace::TraceId;
use fnb_core::transaction::{Transaction, TransactionPayload, TransactionType};
use fnb_router::{BackpressurePolicy, FlowOutcome, FlowResult};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, warn};

use super::AppState;
use crate::error::ApiError;
use crate::propagation;

/// One backend call as reported to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub step: String,
    pub capability: Capability,
    pub status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultKind>,
    pub latency_ms: u64,
    pub attributes: Attributes,
}

impl From<&BackendCallResult> for CallSummary {
    fn from(call: &BackendCallResult) -> Self {
        Self {
            step: call.step.clone(),
            capability: call.capability,
            status: call.status,
            fault: call.fault,
            latency_ms: call.latency_ms,
            attributes: call.attributes.clone(),
        }
    }
}

/// Response body for every flow endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    pub correlation_id: String,
    pub flow_name: String,
    pub transaction_type: TransactionType,
    pub outcome: FlowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total_latency_ms: u64,
    pub trace_id: TraceId,
    pub calls: Vec<CallSummary>,
    pub skipped: Vec<String>,
    pub span_count: usize,
}

impl From<&FlowResult> for FlowResponse {
    fn from(result: &FlowResult) -> Self {
        Self {
            correlation_id: result.correlation_id.clone(),
            flow_name: result.flow_name.clone(),
            transaction_type: result.transaction_type,
            outcome: result.outcome,
            reason: result.reason.clone(),
            total_latency_ms: result.total_latency_ms,
            trace_id: result.trace_id,
            calls: result.calls.iter().map(CallSummary::from).collect(),
            skipped: result.skipped.clone(),
            span_count: result.spans.len(),
        }
    }
}

/// HTTP status for a finished flow
pub fn outcome_status(outcome: FlowOutcome) -> StatusCode {
    match outcome {
        FlowOutcome::Completed => StatusCode::OK,
        FlowOutcome::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
        FlowOutcome::Failed => StatusCode::BAD_GATEWAY,
    }
}

/// The result answering a request.
pub struct Executed {
    pub result: FlowResult,
}

impl Executed {
    /// Status, echo headers and the given body
    ///
    /// The echoed `b3` header is the entry span of the run that produced the
    /// result, so a replay reports the trace its body names.
    pub fn respond<T: Serialize>(&self, body: T) -> Response {
        let headers =
            propagation::response_headers(&self.result.entry, &self.result.correlation_id);
        (outcome_status(self.result.outcome), headers, Json(body)).into_response()
    }
}

impl IntoResponse for Executed {
    fn into_response(self) -> Response {
        self.respond(FlowResponse::from(&self.result))
    }
}

/// Validate, admit and run one transaction for a request.
pub async fn execute(
    state: &AppState,
    headers: &HeaderMap,
    kind: TransactionType,
    payload: TransactionPayload,
) -> Result<Executed, ApiError> {
    counter!("fnb_portal_requests_total", "operation" => kind.operation()).increment(1);

    let entry = propagation::entry_context(headers);
    let seed = state.next_seed();
    let transaction = match propagation::correlation_id(headers) {
        Some(id) => Transaction::with_id(id, kind, payload, seed),
        None => Transaction::new(kind, payload, seed),
    }
    .inspect_err(|_| {
        counter!("fnb_portal_errors_total", "operation" => kind.operation(), "reason" => "validation")
            .increment(1);
    })?;
    let correlation_id = transaction.id().to_string();

    let result = match state.router.config().backpressure {
        BackpressurePolicy::Block => state.router.execute(transaction, entry).await?,
        BackpressurePolicy::Drop => match state.router.try_execute(transaction, entry).await? {
            Some(result) => result,
            None => {
                counter!("fnb_portal_errors_total", "operation" => kind.operation(), "reason" => "overloaded")
                    .increment(1);
                warn!(
                    correlation_id = %correlation_id,
                    transaction_type = %kind,
                    "Router at capacity, refusing request"
                );
                return Err(ApiError::Overloaded);
            }
        },
    };

    // Another run of the same correlation id produced this result.
    if result.entry != entry {
        debug!(
            correlation_id = %correlation_id,
            trace_id = %result.trace_id,
            "Answered with an existing result"
        );
    } else {
        record_flow_metrics(&result);
    }

    Ok(Executed { result })
}

fn record_flow_metrics(result: &FlowResult) {
    let outcome = match result.outcome {
        FlowOutcome::Completed => "completed",
        FlowOutcome::Rejected => "rejected",
        FlowOutcome::Failed => "failed",
    };
    counter!("fnb_flow_outcomes_total", "flow" => result.flow_name.clone(), "outcome" => outcome)
        .increment(1);
    histogram!("fnb_flow_latency_ms", "flow" => result.flow_name.clone())
        .record(result.total_latency_ms as f64);
}
