//! End-to-end flow behaviour against the simulated backends.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use fnb_backends::prelude::*;
use fnb_core::span::{MemorySpanSink, SpanKind};
use fnb_core::trace::TraceContext;
use fnb_core::transaction::{AccountOpenRequest, PaymentRequest, ReconciliationTrigger, Transaction};
use fnb_router::prelude::*;

fn quiet_backends() -> BackendsConfig {
    BackendsConfig {
        fraud: FraudConfig {
            forced_score: Some(20.0),
            ..FraudConfig::default()
        },
        screening: ScreeningConfig {
            hit_rate: 0.0,
            pep_rate: 0.0,
            adverse_media_rate: 0.0,
            ..ScreeningConfig::default()
        },
        notification: NotificationConfig {
            sms_failure_rate: 0.0,
            email_failure_rate: 0.0,
            ..NotificationConfig::default()
        },
        ..BackendsConfig::default()
    }
}

fn router_with(config: RouterConfig, backends: BackendsConfig) -> (FlowRouter, Arc<MemorySpanSink>) {
    let sink = Arc::new(MemorySpanSink::new());
    let router = FlowRouter::new(config, Arc::new(BackendRegistry::new(backends)), sink.clone())
        .expect("standard flows are valid");
    (router, sink)
}

fn instant() -> RouterConfig {
    RouterConfig {
        latency_scale: 0.0,
        ..RouterConfig::default()
    }
}

fn wire(seed: u64) -> Transaction {
    Transaction::wire(
        PaymentRequest {
            source_account: "ACC00000012".to_string(),
            destination_account: "EXT55501234".to_string(),
            amount: 125_000.0,
            currency: "USD".to_string(),
            destination_country: Some("SG".to_string()),
            purpose: Some("INVESTMENT".to_string()),
            destination_routing: None,
            sec_code: None,
        },
        seed,
    )
    .unwrap()
}

fn account_open(seed: u64) -> Transaction {
    Transaction::account_open(
        AccountOpenRequest {
            first_name: "Emily".to_string(),
            last_name: "Brown".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1984, 6, 2).unwrap(),
            account_type: "SAVINGS".to_string(),
            initial_deposit: 2_500.0,
            branch_code: "BR017".to_string(),
            customer_type: "INDIVIDUAL".to_string(),
        },
        seed,
    )
    .unwrap()
}

#[tokio::test]
async fn wire_transfer_completes_through_all_four_steps() {
    let (router, sink) = router_with(instant(), quiet_backends());
    let entry = TraceContext::new_root();

    let result = router.execute(wire(1), entry).await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.flow_name, "payment-processing-flow");
    let steps: Vec<&str> = result.calls.iter().map(|c| c.step.as_str()).collect();
    assert_eq!(steps, ["fraud-check", "aml-screening", "ledger-debit", "notification"]);
    assert!(result.invoked(Capability::NotifyTransaction));
    assert!(!result.invoked(Capability::NotifyRejection));

    // Every span of the transaction reached the sink.
    let spans = sink.by_trace(entry.trace_id());
    assert_eq!(spans.len(), result.spans.len());

    let flow = &result.spans[1];
    assert_eq!(flow.name, "mule:flow/payment-processing-flow");
    assert_eq!(flow.parent_span_id, Some(entry.span_id()));
    assert_eq!(flow.attributes.get_str("flow.correlation_id"), Some(result.correlation_id.as_str()));
    assert_eq!(flow.attributes.get_str("flow.outcome"), Some("completed"));
    assert!(result.spans.iter().any(|s| s.name == "core-banking.debitAccount"));
}

#[tokio::test]
async fn high_fraud_score_rejects_before_ledger_debit() {
    let mut backends = quiet_backends();
    backends.fraud.forced_score = Some(99.0);
    let (router, _) = router_with(instant(), backends);

    let result = router.execute(wire(2), TraceContext::new_root()).await.unwrap();

    assert!(result.is_rejected());
    assert_eq!(result.reason.as_deref(), Some("fraud-check rejected the transaction"));
    assert!(!result.invoked(Capability::LedgerDebit));
    assert!(!result.invoked(Capability::AmlScreen));
    assert!(result.skipped.contains(&"ledger-debit".to_string()));

    let notice = result.call("notification").unwrap();
    assert_eq!(notice.capability, Capability::NotifyRejection);
    assert_eq!(
        notice.attributes.get_str("notification.type"),
        Some("TRANSACTION_REJECTED")
    );
    assert_eq!(router.counters().rejected, 1);
    assert_eq!(
        router.backends().snapshot().backends[&Backend::Ledger].calls,
        0
    );
}

#[tokio::test]
async fn rejection_notice_can_be_disabled() {
    let mut backends = quiet_backends();
    backends.fraud.forced_score = Some(99.5);
    let config = RouterConfig {
        notify_on_reject: false,
        ..instant()
    };
    let (router, _) = router_with(config, backends);

    let result = router.execute(wire(3), TraceContext::new_root()).await.unwrap();

    assert!(result.is_rejected());
    assert_eq!(result.calls.len(), 1);
    assert_eq!(
        result.skipped,
        ["aml-screening", "ledger-debit", "notification"].map(String::from)
    );
}

#[tokio::test]
async fn ofac_hit_rejects_payment_at_screening() {
    let mut backends = quiet_backends();
    backends.screening.hit_rate = 1.0;
    backends.screening.watchlists = vec!["OFAC-SDN".to_string()];
    let (router, _) = router_with(instant(), backends);

    let result = router.execute(wire(4), TraceContext::new_root()).await.unwrap();

    assert!(result.is_rejected());
    assert_eq!(result.reason.as_deref(), Some("aml-screening rejected the transaction"));
    let screening = result.call("aml-screening").unwrap();
    assert_eq!(screening.attributes.get_bool("aml.ofac_hit"), Some(true));
    assert!(!result.invoked(Capability::LedgerDebit));
}

#[tokio::test]
async fn kyc_hard_hit_rejects_before_account_creation() {
    let mut backends = quiet_backends();
    backends.screening.hit_rate = 1.0;
    backends.screening.watchlists = vec!["OFAC-SDN".to_string()];
    let (router, _) = router_with(instant(), backends);

    let result = router
        .execute(account_open(5), TraceContext::new_root())
        .await
        .unwrap();

    assert!(result.is_rejected());
    assert!(!result.invoked(Capability::ProfileCreate));
    assert!(!result.invoked(Capability::LedgerCreateAccount));
    assert!(!result.invoked(Capability::NotifyAccountOpened));
}

#[tokio::test]
async fn account_opening_creates_customer_and_account() {
    let (router, _) = router_with(instant(), quiet_backends());

    let result = router
        .execute(account_open(6), TraceContext::new_root())
        .await
        .unwrap();

    assert!(result.is_completed());
    let created = result.call("ledger-create").unwrap();
    assert!(created.attributes.get_str("account.id").unwrap().starts_with("ACC"));
    assert_eq!(created.attributes.get_str("account.type"), Some("SAVINGS"));
    let kit = result.call("welcome-notification").unwrap();
    assert_eq!(kit.attributes.get_str("notification.channel"), Some("email"));
}

#[tokio::test]
async fn reconciliation_makes_exactly_one_position_lookup() {
    let (router, _) = router_with(instant(), quiet_backends());
    let tx = Transaction::reconciliation(ReconciliationTrigger::OnDemand, 7).unwrap();

    let result = router.execute(tx, TraceContext::new_root()).await.unwrap();

    assert!(result.is_completed());
    assert_eq!(result.calls.len(), 1);
    assert_eq!(result.calls[0].capability, Capability::LedgerTradePositions);
    assert!(result.calls[0].attributes.get_i64("recon.positions").is_some());
}

#[tokio::test]
async fn unavailable_ledger_fails_reconciliation() {
    let mut backends = quiet_backends();
    backends.ledger.unavailable_rate = 1.0;
    let (router, _) = router_with(instant(), backends);
    let tx = Transaction::reconciliation(ReconciliationTrigger::Scheduled, 8).unwrap();

    let result = router.execute(tx, TraceContext::new_root()).await.unwrap();

    assert!(result.is_failed());
    assert_eq!(result.reason.as_deref(), Some("trade-positions failed: unavailable"));
    assert_eq!(router.counters().failed, 1);
}

#[tokio::test]
async fn sequential_step_timeout_fails_the_payment() {
    let mut backends = quiet_backends();
    backends.ledger.slow_query_rate = 1.0;
    let config = RouterConfig {
        step_timeout_ms: 1_000,
        ..instant()
    };
    let (router, _) = router_with(config, backends);

    let result = router.execute(wire(9), TraceContext::new_root()).await.unwrap();

    assert!(result.is_failed());
    assert_eq!(result.reason.as_deref(), Some("ledger-debit timed out"));
    let debit = result.call("ledger-debit").unwrap();
    assert_eq!(debit.fault, Some(FaultKind::Timeout));
    assert_eq!(debit.latency_ms, 1_000);
    assert!(!result.invoked(Capability::NotifyTransaction));
}

#[tokio::test]
async fn slow_query_is_data_not_failure() {
    let mut backends = quiet_backends();
    backends.ledger.slow_query_rate = 1.0;
    let (router, _) = router_with(instant(), backends);

    let result = router.execute(wire(10), TraceContext::new_root()).await.unwrap();

    assert!(result.is_completed());
    let debit = result.call("ledger-debit").unwrap();
    assert_eq!(debit.fault, Some(FaultKind::SlowQuery));
    assert_eq!(debit.attributes.get_str("db.sql.table"), Some("accounts_ledger"));
}

#[tokio::test]
async fn spans_form_one_tree_per_transaction() {
    let (router, _) = router_with(instant(), quiet_backends());
    let entry = TraceContext::new_root();

    let result = router
        .execute(Transaction::customer_360("CUST000042", 11).unwrap(), entry)
        .await
        .unwrap();

    let ids: HashSet<_> = result.spans.iter().map(|s| s.span_id).collect();
    assert_eq!(ids.len(), result.spans.len(), "span ids are unique");

    for span in &result.spans {
        assert_eq!(span.trace_id, entry.trace_id());
        match span.parent_span_id {
            None => assert_eq!(span.span_id, entry.span_id()),
            Some(parent) => assert!(ids.contains(&parent), "{} has a dangling parent", span.name),
        }
    }

    assert_eq!(result.spans[0].name, "portal.getCustomer360");
    assert!(result.spans.iter().any(|s| s.name == "mule:scatter-gather"));
    assert!(result.spans.iter().any(|s| s.name == "mule:route/crm"));
    assert_eq!(
        result
            .spans
            .iter()
            .filter(|s| s.kind == SpanKind::Server)
            .count(),
        1 + result.calls.len()
    );
}

#[tokio::test(start_paused = true)]
async fn customer_360_waits_for_both_branches() {
    let mut backends = quiet_backends();
    backends.ledger.slow_query_rate = 0.0;
    let (router, _) = router_with(RouterConfig::default(), backends);
    let started = tokio::time::Instant::now();

    let result = router
        .execute(
            Transaction::customer_360("CUST000003", 12).unwrap(),
            TraceContext::new_root(),
        )
        .await
        .unwrap();

    assert!(result.is_completed());
    assert_eq!(result.calls.len(), 4);

    let crm: u64 = ["crm-profile", "crm-interactions"]
        .iter()
        .map(|s| result.call(s).unwrap().latency_ms)
        .sum();
    let core: u64 = ["core-balance", "core-transactions"]
        .iter()
        .map(|s| result.call(s).unwrap().latency_ms)
        .sum();
    assert_eq!(result.total_latency_ms, crm.max(core));
    assert!(started.elapsed().as_millis() as u64 >= crm.max(core));
}

#[tokio::test(start_paused = true)]
async fn branch_timeout_still_completes_with_partial_result() {
    let mut backends = quiet_backends();
    backends.ledger.slow_query_rate = 1.0;
    let config = RouterConfig {
        branch_timeout_ms: 3_000,
        ..RouterConfig::default()
    };
    let (router, _) = router_with(config, backends);
    let started = tokio::time::Instant::now();

    let result = router
        .execute(
            Transaction::customer_360("CUST000004", 13).unwrap(),
            TraceContext::new_root(),
        )
        .await
        .unwrap();

    assert!(result.is_completed());
    let balance = result.call("core-balance").unwrap();
    assert_eq!(balance.fault, Some(FaultKind::Timeout));
    assert_eq!(balance.latency_ms, 3_000);
    assert_eq!(result.skipped, vec!["core-transactions".to_string()]);
    assert!(result.call("crm-interactions").is_some());
    assert_eq!(result.total_latency_ms, 3_000);

    let elapsed = started.elapsed().as_millis() as u64;
    assert!((3_000..4_000).contains(&elapsed));

    let route = result
        .spans
        .iter()
        .find(|s| s.name == "mule:route/core-banking")
        .unwrap();
    assert_eq!(route.attributes.get_bool("route.timed_out"), Some(true));
}
