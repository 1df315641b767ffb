//! Execution of one transaction through its flow.
//!
//! Time is tracked twice. The simulated cursor advances by each call's
//! sampled latency and drives span offsets and timeout decisions; the real
//! wait is that latency multiplied by the latency scale. Timeouts therefore
//! depend only on the seed, never on how fast the host runs.

use std::collections::HashSet;
use std::time::Duration;

use fnb_backends::{BackendCallResult, BackendRegistry, BackendRequest, Capability, FaultKind};
use fnb_core::rng::SimRng;
use fnb_core::span::{Attributes, SpanKind, SpanRecord, SpanStatus};
use fnb_core::trace::TraceContext;
use fnb_core::transaction::{ReconciliationTrigger, Transaction, TransactionPayload};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RouterError;
use crate::flow::{AfterReject, Branch, FlowDefinition, FlowStep, Stage};
use crate::result::{FlowResult, CANCELLED_REASON as CANCELLED};
use crate::state::{FlowOutcome, FlowState};

/// Decision made by a blocking step.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Rejected(String),
    Failed(String),
}

/// One backend call with the spans it produced.
#[derive(Debug)]
struct Call {
    result: BackendCallResult,
    start_ms: u64,
    spans: Vec<SpanRecord>,
}

impl Call {
    fn end_ms(&self) -> u64 {
        self.start_ms + self.result.latency_ms
    }

    fn is_cancelled(&self) -> bool {
        self.result.fault == Some(FaultKind::Cancelled)
    }
}

#[derive(Debug)]
struct BranchRun {
    calls: Vec<Call>,
    route_span: SpanRecord,
    end_ms: u64,
    timed_out: bool,
    cancelled: bool,
}

/// A single run of `definition` for `transaction`.
pub struct FlowExecution<'a> {
    backends: &'a BackendRegistry,
    definition: &'a FlowDefinition,
    transaction: &'a Transaction,
    fields: Attributes,
    latency_scale: f64,
    token: &'a CancellationToken,
}

impl<'a> FlowExecution<'a> {
    pub fn new(
        backends: &'a BackendRegistry,
        definition: &'a FlowDefinition,
        transaction: &'a Transaction,
        latency_scale: f64,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            backends,
            definition,
            transaction,
            fields: payload_fields(transaction),
            latency_scale,
            token,
        }
    }

    /// Run every stage and build the result.
    ///
    /// `entry` is the context of the hop that submitted the transaction; the
    /// flow span becomes its child.
    pub async fn run(&self, entry: TraceContext) -> Result<FlowResult, RouterError> {
        let mut state = FlowState::Pending;
        state.advance(FlowState::Running)?;

        let mut rng = SimRng::from_seed(self.transaction.seed());
        let flow_ctx = entry.child();

        let mut cursor = 0u64;
        let mut verdict: Option<Verdict> = None;
        let mut cancelled = false;
        let mut ran: HashSet<&str> = HashSet::new();
        let mut calls = Vec::new();
        let mut spans = Vec::new();

        for stage in self.definition.plan() {
            match stage {
                Stage::Step(step) => {
                    let capability = match &verdict {
                        None if deps_met(step, &ran) => step.capability,
                        None => continue,
                        Some(Verdict::Failed(_)) => continue,
                        Some(Verdict::Rejected(_)) => match step.after_reject {
                            AfterReject::Skip => continue,
                            AfterReject::Substitute(capability) => capability,
                        },
                    };

                    let Some(call) = self
                        .call(step, capability, &flow_ctx, cursor, step.timeout_ms, &mut rng)
                        .await
                    else {
                        cancelled = true;
                        break;
                    };

                    cursor = call.end_ms();
                    ran.insert(step.name.as_str());
                    let interrupted = call.is_cancelled();
                    if verdict.is_none() && !interrupted {
                        verdict = classify(step, &call.result, false);
                    }
                    spans.extend(call.spans);
                    calls.push(call.result);
                    if interrupted {
                        cancelled = true;
                        break;
                    }
                }
                Stage::ScatterGather(branches) => {
                    if verdict.is_some() {
                        continue;
                    }

                    let sg_ctx = flow_ctx.child();
                    let start = cursor;
                    let deadline = start + self.definition.branch_timeout_ms;

                    let mut runs = Vec::with_capacity(branches.len());
                    {
                        let ran_before = &ran;
                        let mut pending: FuturesUnordered<_> = branches
                            .iter()
                            .map(|branch| {
                                let branch_rng = rng.fork();
                                self.run_branch(branch, sg_ctx, ran_before, start, deadline, branch_rng)
                            })
                            .collect();
                        while let Some(run) = pending.next().await {
                            runs.push(run);
                        }
                    }

                    let end = runs.iter().map(|r| r.end_ms).max().unwrap_or(start);
                    let timed_out = runs.iter().filter(|r| r.timed_out).count();
                    cancelled = runs.iter().any(|r| r.cancelled);

                    let mut sg_span =
                        SpanRecord::new(&sg_ctx, "mule:scatter-gather", SpanKind::Internal)
                            .timed(start, end - start)
                            .with_attributes(
                                Attributes::new()
                                    .with("scatter_gather.branches", branches.len())
                                    .with("scatter_gather.timed_out_branches", timed_out),
                            );
                    if timed_out > 0 {
                        sg_span = sg_span.with_status(SpanStatus::Error);
                    }
                    spans.push(sg_span);

                    // Completion order on the simulated timeline; ties keep
                    // the order in which the branches actually finished.
                    let mut merged = Vec::new();
                    for run in runs {
                        spans.push(run.route_span);
                        merged.extend(run.calls);
                    }
                    merged.sort_by_key(Call::end_ms);

                    for call in merged {
                        if let Some(step) = self.definition.find(&call.result.step) {
                            ran.insert(step.name.as_str());
                            if verdict.is_none() && !call.is_cancelled() {
                                verdict = classify(step, &call.result, true);
                            }
                        }
                        spans.extend(call.spans);
                        calls.push(call.result);
                    }

                    cursor = end;
                    if cancelled {
                        break;
                    }
                }
            }
        }

        let (outcome, reason) = if cancelled {
            (FlowOutcome::Failed, Some(CANCELLED.to_string()))
        } else {
            match verdict {
                None => (FlowOutcome::Completed, None),
                Some(Verdict::Rejected(reason)) => (FlowOutcome::Rejected, Some(reason)),
                Some(Verdict::Failed(reason)) => (FlowOutcome::Failed, Some(reason)),
            }
        };
        state.advance(outcome.into())?;

        let skipped = self
            .definition
            .steps
            .iter()
            .filter(|s| !ran.contains(s.name.as_str()))
            .map(|s| s.name.clone())
            .collect();

        let mut all_spans = Vec::with_capacity(spans.len() + 2);
        all_spans.push(self.entry_span(&entry, cursor, outcome));
        all_spans.push(self.flow_span(&flow_ctx, cursor, outcome, reason.as_deref()));
        all_spans.extend(spans);

        Ok(FlowResult {
            correlation_id: self.transaction.id().to_string(),
            flow_name: self.definition.name.clone(),
            transaction_type: self.transaction.kind(),
            outcome,
            reason,
            total_latency_ms: cursor,
            calls,
            skipped,
            trace_id: entry.trace_id(),
            entry,
            spans: all_spans,
        })
    }

    async fn run_branch(
        &self,
        branch: &Branch<'_>,
        parent: TraceContext,
        ran_before: &HashSet<&str>,
        start: u64,
        deadline: u64,
        mut rng: SimRng,
    ) -> BranchRun {
        let route = parent.child();
        let mut cursor = start;
        let mut calls: Vec<Call> = Vec::new();
        let mut ran: HashSet<&str> = HashSet::new();
        let mut timed_out = false;
        let mut cancelled = false;

        for step in &branch.steps {
            let met = step
                .depends_on
                .iter()
                .all(|d| ran.contains(d.as_str()) || ran_before.contains(d.as_str()));
            if !met {
                continue;
            }

            let remaining = deadline.saturating_sub(cursor);
            if remaining == 0 {
                ran.insert(step.name.as_str());
                calls.push(self.expired(step, &route, cursor));
                timed_out = true;
                break;
            }
            let budget = step.timeout_ms.min(remaining);

            let Some(call) = self
                .call(step, step.capability, &route, cursor, budget, &mut rng)
                .await
            else {
                cancelled = true;
                break;
            };

            cursor = call.end_ms();
            ran.insert(step.name.as_str());
            let fault = call.result.fault;
            calls.push(call);

            match fault {
                Some(FaultKind::Timeout) => {
                    timed_out = true;
                    break;
                }
                Some(FaultKind::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Some(kind) if kind.is_unrecoverable() => break,
                _ => {}
            }
        }

        let mut route_span = SpanRecord::new(
            &route,
            format!("mule:route/{}", branch.name),
            SpanKind::Internal,
        )
        .timed(start, cursor - start)
        .with_attributes(
            Attributes::new()
                .with("route.name", branch.name)
                .with("route.timed_out", timed_out),
        );
        if timed_out {
            route_span = route_span.with_status(SpanStatus::Error);
        }

        BranchRun {
            calls,
            route_span,
            end_ms: cursor,
            timed_out,
            cancelled,
        }
    }

    /// Invoke one backend and wait out its latency.
    ///
    /// Returns `None` if the transaction was already cancelled, in which
    /// case the backend is never invoked. A call interrupted while waiting
    /// comes back as a `Cancelled` fault with no backend output.
    async fn call(
        &self,
        step: &FlowStep,
        capability: Capability,
        parent: &TraceContext,
        start_ms: u64,
        budget_ms: u64,
        rng: &mut SimRng,
    ) -> Option<Call> {
        if self.token.is_cancelled() {
            return None;
        }

        let client = parent.child();
        let request = BackendRequest::new(
            &step.name,
            capability,
            self.transaction.id(),
            client.to_header(),
        )
        .with_fields(self.fields.clone());

        let result = match self.backends.invoke(&request, rng) {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    correlation_id = %self.transaction.id(),
                    step = %step.name,
                    error = %err,
                    "Backend call failed"
                );
                BackendCallResult::ok(&step.name, capability, client.child(), 0)
                    .with_fault(FaultKind::Unavailable)
                    .with_attributes(Attributes::new().with("error.message", err.to_string()))
            }
        };

        let backend_ms = result.latency_ms;
        let result = if backend_ms > budget_ms {
            result.into_timeout(budget_ms)
        } else {
            result
        };

        let answered = self.wait(result.latency_ms).await;
        let result = if answered {
            result
        } else {
            result.into_cancelled()
        };

        debug!(
            correlation_id = %self.transaction.id(),
            step = %step.name,
            capability = %capability,
            status = ?result.status,
            latency_ms = result.latency_ms,
            "Step finished"
        );

        let mut spans = vec![client_span(step, &client, start_ms, &result)];
        if answered {
            spans.push(
                SpanRecord::new(&result.context, capability.span_name(), SpanKind::Server)
                    .timed(start_ms, backend_ms)
                    .with_status(call_status(&result))
                    .with_attributes(result.attributes.clone()),
            );
        }

        Some(Call {
            result,
            start_ms,
            spans,
        })
    }

    /// A step whose branch deadline had already passed when it came up.
    ///
    /// The backend is not invoked; the step is recorded as a zero-length
    /// timeout so the branch result still names it.
    fn expired(&self, step: &FlowStep, parent: &TraceContext, start_ms: u64) -> Call {
        let client = parent.child();
        let result =
            BackendCallResult::ok(&step.name, step.capability, client.child(), 0).into_timeout(0);
        debug!(
            correlation_id = %self.transaction.id(),
            step = %step.name,
            "Branch deadline passed before step"
        );
        Call {
            spans: vec![client_span(step, &client, start_ms, &result)],
            result,
            start_ms,
        }
    }

    /// Sleep for the scaled latency. Returns `false` when cancelled.
    async fn wait(&self, latency_ms: u64) -> bool {
        let real_ms = latency_ms as f64 * self.latency_scale;
        if !real_ms.is_finite() || real_ms <= 0.0 {
            tokio::task::yield_now().await;
            return !self.token.is_cancelled();
        }

        let sleep = tokio::time::sleep(Duration::from_secs_f64(real_ms / 1000.0));
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = sleep => !self.token.is_cancelled(),
        }
    }

    fn entry_span(&self, entry: &TraceContext, duration: u64, outcome: FlowOutcome) -> SpanRecord {
        let kind = self.transaction.kind();
        SpanRecord::new(entry, format!("portal.{}", kind.operation()), SpanKind::Server)
            .timed(0, duration)
            .with_status(span_status(outcome))
            .with_attributes(
                Attributes::new()
                    .with("transaction.type", kind.as_str())
                    .with("transaction.id", self.transaction.id()),
            )
    }

    fn flow_span(
        &self,
        flow_ctx: &TraceContext,
        duration: u64,
        outcome: FlowOutcome,
        reason: Option<&str>,
    ) -> SpanRecord {
        let mut attributes = Attributes::new()
            .with("flow.name", self.definition.name.as_str())
            .with("flow.correlation_id", self.transaction.id())
            .with("flow.outcome", outcome.to_string());
        if let Some(reason) = reason {
            attributes.set("flow.reason", reason);
        }

        SpanRecord::new(
            flow_ctx,
            format!("mule:flow/{}", self.definition.name),
            SpanKind::Internal,
        )
        .timed(0, duration)
        .with_status(span_status(outcome))
        .with_attributes(attributes)
    }
}

fn call_status(result: &BackendCallResult) -> SpanStatus {
    if result.is_ok() {
        SpanStatus::Ok
    } else {
        SpanStatus::Error
    }
}

/// Client-side span of the integration layer's outbound request.
fn client_span(
    step: &FlowStep,
    client: &TraceContext,
    start_ms: u64,
    result: &BackendCallResult,
) -> SpanRecord {
    let capability = result.capability;
    let mut attributes = Attributes::new()
        .with("mule.step", step.name.as_str())
        .with("peer.service", capability.backend().service_name());
    if let Some(fault) = result.fault {
        attributes.set("fault.kind", fault.as_str());
    }
    SpanRecord::new(
        client,
        format!("mule:http:request/{}", capability.operation()),
        SpanKind::Client,
    )
    .timed(start_ms, result.latency_ms)
    .with_status(call_status(result))
    .with_attributes(attributes)
}

fn span_status(outcome: FlowOutcome) -> SpanStatus {
    match outcome {
        FlowOutcome::Failed => SpanStatus::Error,
        FlowOutcome::Completed | FlowOutcome::Rejected => SpanStatus::Ok,
    }
}

fn deps_met(step: &FlowStep, ran: &HashSet<&str>) -> bool {
    step.depends_on.iter().all(|d| ran.contains(d.as_str()))
}

/// Decide whether a call settles the outcome.
///
/// Only blocking steps decide. A timeout inside a scatter-gather branch is
/// recoverable; the same timeout on a sequential step is not.
fn classify(step: &FlowStep, result: &BackendCallResult, in_branch: bool) -> Option<Verdict> {
    if !step.blocking {
        return None;
    }
    if result.is_rejected() {
        return Some(Verdict::Rejected(format!(
            "{} rejected the transaction",
            step.name
        )));
    }
    match result.fault {
        Some(FaultKind::Timeout) if !in_branch => {
            Some(Verdict::Failed(format!("{} timed out", step.name)))
        }
        Some(kind) if kind.is_unrecoverable() => {
            Some(Verdict::Failed(format!("{} failed: {kind}", step.name)))
        }
        _ => None,
    }
}

/// Business inputs passed to every backend call of a transaction.
fn payload_fields(transaction: &Transaction) -> Attributes {
    let mut fields = Attributes::new();
    match transaction.payload() {
        TransactionPayload::Payment(p) => {
            fields
                .set("account.id", p.source_account.as_str())
                .set("destination.account", p.destination_account.as_str())
                .set("transaction.amount", p.amount)
                .set("transaction.currency", p.currency.as_str());
            if let Some(country) = &p.destination_country {
                fields.set("destination.country", country.as_str());
            }
        }
        TransactionPayload::Customer360(c) => {
            fields.set("customer.id", c.customer_id.as_str());
            if let Some(account) = primary_account(&c.customer_id) {
                fields.set("account.id", account);
            }
        }
        TransactionPayload::AccountOpen(a) => {
            fields
                .set("account.type", a.account_type.as_str())
                .set("customer.type", a.customer_type.as_str())
                .set("transaction.amount", a.initial_deposit)
                .set("branch.code", a.branch_code.as_str());
        }
        TransactionPayload::Reconciliation { trigger } => {
            let trigger = match trigger {
                ReconciliationTrigger::Scheduled => "SCHEDULED",
                ReconciliationTrigger::OnDemand => "ON_DEMAND",
            };
            fields.set("recon.trigger", trigger);
        }
    }
    fields
}

/// `CUST000042` holds account `ACC00000042`.
fn primary_account(customer_id: &str) -> Option<String> {
    let n: u64 = customer_id.strip_prefix("CUST")?.parse().ok()?;
    Some(format!("ACC{n:08}"))
}
