//! Concurrent transactions: isolation, cancellation and idempotent retries.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use fnb_backends::prelude::*;
use fnb_core::span::MemorySpanSink;
use fnb_core::trace::TraceContext;
use fnb_core::transaction::{
    PaymentRequest, ReconciliationTrigger, Transaction, TransactionPayload, TransactionType,
};
use fnb_router::prelude::*;

fn router(config: RouterConfig, backends: BackendsConfig) -> (FlowRouter, Arc<MemorySpanSink>) {
    let sink = Arc::new(MemorySpanSink::new());
    let router = FlowRouter::new(config, Arc::new(BackendRegistry::new(backends)), sink.clone())
        .expect("standard flows are valid");
    (router, sink)
}

fn slow_ledger() -> BackendsConfig {
    let mut backends = BackendsConfig::default();
    backends.ledger.slow_query_rate = 1.0;
    backends
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_span_trees_never_interleave() {
    let (router, sink) = router(
        RouterConfig {
            latency_scale: 0.0,
            ..RouterConfig::default()
        },
        BackendsConfig::default(),
    );

    let mut handles = Vec::new();
    let mut entries = Vec::new();
    for seed in 0..16u64 {
        let tx = Transaction::customer_360(format!("CUST{:06}", seed + 1), seed).unwrap();
        let entry = TraceContext::new_root();
        entries.push(entry);
        let permit = router.admit().await.unwrap();
        handles.push(router.spawn(permit, tx, entry));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let mut all_ids = HashSet::new();
    for entry in &entries {
        let spans = sink.by_trace(entry.trace_id());
        assert!(!spans.is_empty());

        let ids: HashSet<_> = spans.iter().map(|s| s.span_id).collect();
        assert_eq!(ids.len(), spans.len());
        for span in &spans {
            if let Some(parent) = span.parent_span_id {
                assert!(ids.contains(&parent), "parent of {} is in another trace", span.name);
            }
        }
        all_ids.extend(ids);
    }
    assert_eq!(all_ids.len(), sink.len());
    assert_eq!(router.counters().completed + router.counters().failed, 16);
}

#[tokio::test(start_paused = true)]
async fn cancelling_one_transaction_leaves_the_other_alone() {
    let (router, _) = router(RouterConfig::default(), slow_ledger());

    let doomed = Transaction::reconciliation(ReconciliationTrigger::OnDemand, 1).unwrap();
    let survivor = Transaction::reconciliation(ReconciliationTrigger::OnDemand, 2).unwrap();
    let doomed_id = doomed.id().to_string();

    let a = router.spawn(router.try_admit().unwrap(), doomed, TraceContext::new_root());
    let b = router.spawn(router.try_admit().unwrap(), survivor, TraceContext::new_root());

    // Slow queries take at least 4 s, so both are still waiting here.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(router.in_flight(), 2);
    assert!(router.cancel(&doomed_id));

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert!(a.is_failed());
    assert_eq!(a.reason.as_deref(), Some("cancelled"));
    // The interrupted query is recorded but carries no backend output.
    assert_eq!(a.calls.len(), 1);
    assert_eq!(a.calls[0].fault, Some(FaultKind::Cancelled));
    assert_eq!(a.calls[0].latency_ms, 0);
    assert_eq!(a.total_latency_ms, 0);
    assert!(b.is_completed());
    assert_eq!(b.calls.len(), 1);

    let counters = router.counters();
    assert_eq!(counters.cancelled, 1);
    assert_eq!(counters.completed, 1);
    assert_eq!(counters.in_flight, 0);

    // Cancelled runs are not cached, so a retry executes again.
    assert!(router.cached(&doomed_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_all_signals_every_in_flight_transaction() {
    let (router, _) = router(RouterConfig::default(), slow_ledger());

    let handles: Vec<_> = (0..3)
        .map(|seed| {
            let tx = Transaction::reconciliation(ReconciliationTrigger::OnDemand, seed).unwrap();
            router.spawn(router.try_admit().unwrap(), tx, TraceContext::new_root())
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(router.cancel_all(), 3);

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.reason.as_deref(), Some("cancelled"));
    }
    assert_eq!(router.cancel_all(), 0);
}

#[tokio::test]
async fn retry_with_same_correlation_id_is_idempotent() {
    let (router, sink) = router(
        RouterConfig {
            latency_scale: 0.0,
            ..RouterConfig::default()
        },
        BackendsConfig::default(),
    );
    let tx = Transaction::with_id(
        "retry-0001",
        TransactionType::ReconciliationBatch,
        TransactionPayload::Reconciliation {
            trigger: ReconciliationTrigger::OnDemand,
        },
        77,
    )
    .unwrap();

    let first = router.execute(tx.clone(), TraceContext::new_root()).await.unwrap();
    let spans_after_first = sink.len();
    let second = router.execute(tx, TraceContext::new_root()).await.unwrap();

    assert_eq!(first.correlation_id, "retry-0001");
    assert_eq!(second.trace_id, first.trace_id);
    assert_eq!(second.calls, first.calls);
    assert_eq!(sink.len(), spans_after_first);
    assert_eq!(
        router.backends().snapshot().backends[&Backend::Ledger].calls,
        1
    );
    assert_eq!(router.counters().cache_hits, 1);
}

fn wire_with_id(id: &str, seed: u64) -> Transaction {
    Transaction::with_id(
        id,
        TransactionType::Wire,
        TransactionPayload::Payment(PaymentRequest {
            source_account: "ACC00000031".to_string(),
            destination_account: "EXT55507788".to_string(),
            amount: 48_000.0,
            currency: "USD".to_string(),
            destination_country: Some("GB".to_string()),
            purpose: None,
            destination_routing: None,
            sec_code: None,
        }),
        seed,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn overlapping_retry_joins_the_running_transaction() {
    let mut backends = BackendsConfig::default();
    backends.fraud.forced_score = Some(12.0);
    backends.screening.hit_rate = 0.0;
    let (router, sink) = router(RouterConfig::default(), backends);
    let tx = wire_with_id("teller-7-0042", 19);

    // The teller times out and resends while the first request is running.
    let (first, retry) = tokio::join!(
        router.execute(tx.clone(), TraceContext::new_root()),
        router.execute(tx, TraceContext::new_root()),
    );
    let first = first.unwrap();
    let retry = retry.unwrap();

    assert_eq!(first.outcome, retry.outcome);
    assert_eq!(retry.trace_id, first.trace_id);
    assert_eq!(retry.calls, first.calls);
    assert_eq!(sink.len(), first.spans.len());

    let ledger = router.backends().snapshot().backends[&Backend::Ledger].calls;
    assert_eq!(ledger, 1, "ledger debited more than once for one correlation id");

    let counters = router.counters();
    assert_eq!(counters.completed + counters.rejected + counters.failed, 1);
    assert_eq!(counters.cache_hits, 1);
    assert_eq!(counters.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_after_cancellation_runs_afresh() {
    let (router, _) = router(RouterConfig::default(), slow_ledger());
    let tx = Transaction::with_id(
        "recon-rerun",
        TransactionType::ReconciliationBatch,
        TransactionPayload::Reconciliation {
            trigger: ReconciliationTrigger::OnDemand,
        },
        4,
    )
    .unwrap();

    let doomed = router.spawn(router.try_admit().unwrap(), tx.clone(), TraceContext::new_root());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(router.cancel("recon-rerun"));

    // Sent right after the cancel, possibly before the cancelled run has
    // unwound.
    let retry = router.spawn(router.try_admit().unwrap(), tx, TraceContext::new_root());

    let doomed = doomed.await.unwrap().unwrap();
    let retry = retry.await.unwrap().unwrap();

    assert!(doomed.is_cancelled());
    assert!(retry.is_completed());
    assert_ne!(retry.trace_id, doomed.trace_id);
    assert_eq!(router.cached("recon-rerun").unwrap().trace_id, retry.trace_id);
    assert_eq!(router.counters().cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn blocked_producer_waits_for_capacity() {
    let (router, _) = router(
        RouterConfig {
            max_in_flight: 1,
            ..RouterConfig::default()
        },
        BackendsConfig::default(),
    );

    let first = Transaction::reconciliation(ReconciliationTrigger::OnDemand, 5).unwrap();
    let running = router.spawn(router.try_admit().unwrap(), first, TraceContext::new_root());
    assert!(router.try_admit().is_none());

    // admit() resolves only once the running transaction releases its slot.
    let permit = router.admit().await.unwrap();
    assert_eq!(router.in_flight(), 1);
    drop(permit);

    let result = running.await.unwrap().unwrap();
    assert!(result.is_completed());
}
