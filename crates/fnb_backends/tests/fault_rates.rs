//! Statistical checks of the injected fault distributions.
//!
//! Each test draws enough calls that the observed rate sits well within the
//! tolerance for any seed; a fixed seed keeps the runs reproducible.

use approx::assert_abs_diff_eq;
use fnb_backends::prelude::*;
use fnb_core::rng::SimRng;
use fnb_core::trace::TraceContext;

const CALLS: usize = 20_000;

fn request(capability: Capability) -> BackendRequest {
    BackendRequest::new(
        "stat",
        capability,
        "corr-stat",
        TraceContext::new_root().to_header(),
    )
}

/// Slow queries occur at about 10% with latency in [4000, 5500] ms, and
/// normal queries stay within [150, 200] ms.
#[test]
fn ledger_slow_query_distribution() {
    let registry = BackendRegistry::default();
    let mut rng = SimRng::from_seed(2024);
    let req = request(Capability::LedgerDebit);

    let mut slow = 0usize;
    for _ in 0..CALLS {
        let result = registry.invoke(&req, &mut rng).unwrap();
        if result.fault == Some(FaultKind::SlowQuery) {
            slow += 1;
            assert!((4000..=5500).contains(&result.latency_ms));
            assert_eq!(result.attributes.get_bool("slow_query"), Some(true));
            assert_eq!(
                result.attributes.get_str("db.sql.table"),
                Some("accounts_ledger")
            );
        } else {
            assert!(result.is_ok());
            assert!((150..=200).contains(&result.latency_ms));
        }
    }

    let rate = slow as f64 / CALLS as f64;
    assert_abs_diff_eq!(rate, 0.10, epsilon = 0.015);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.backends[&Backend::Ledger].calls, CALLS as u64);
    assert_eq!(snapshot.backends[&Backend::Ledger].faults, slow as u64);
}

/// About 5% of scores land at or above the 95 threshold.
#[test]
fn fraud_flag_rate() {
    let registry = BackendRegistry::default();
    let mut rng = SimRng::from_seed(7);
    let req = request(Capability::FraudScore);

    let mut flagged = 0usize;
    for _ in 0..CALLS {
        let result = registry.invoke(&req, &mut rng).unwrap();
        let score = result.attributes.get_f64("fraud.score").unwrap();
        assert!((0.0..100.0).contains(&score));
        if result.attributes.get_bool("fraud.flagged") == Some(true) {
            flagged += 1;
            assert!(result.is_rejected());
        }
    }

    let rate = flagged as f64 / CALLS as f64;
    assert_abs_diff_eq!(rate, 0.05, epsilon = 0.01);
}

/// About 2% of screenings match a watchlist; only OFAC matches reject.
#[test]
fn aml_match_rate() {
    let registry = BackendRegistry::default();
    let mut rng = SimRng::from_seed(99);
    let req = request(Capability::AmlScreen);

    let mut matches = 0usize;
    for _ in 0..CALLS {
        let result = registry.invoke(&req, &mut rng).unwrap();
        if result.attributes.get_bool("aml.match_found") == Some(true) {
            matches += 1;
            let list = result.attributes.get_str("aml.watchlist").unwrap();
            assert_eq!(result.is_rejected(), list.starts_with("OFAC"));
            assert_eq!(
                result.attributes.get_bool("aml.ofac_hit"),
                Some(list.starts_with("OFAC"))
            );
        } else {
            assert!(result.is_ok());
        }
    }

    let rate = matches as f64 / CALLS as f64;
    assert_abs_diff_eq!(rate, 0.02, epsilon = 0.006);
}

/// SMS and email each fail about 2% of the time, independently.
#[test]
fn notification_channel_failure_rates() {
    let registry = BackendRegistry::default();
    let mut rng = SimRng::from_seed(5);
    let req = request(Capability::NotifyTransaction);

    for _ in 0..CALLS {
        registry.invoke(&req, &mut rng).unwrap();
    }

    let snapshot = registry.snapshot();
    let sms = snapshot.channels[&Channel::Sms];
    let email = snapshot.channels[&Channel::Email];

    assert_eq!(sms.attempts, CALLS as u64);
    assert_eq!(email.attempts, CALLS as u64);
    assert_abs_diff_eq!(sms.failure_rate(), 0.02, epsilon = 0.006);
    assert_abs_diff_eq!(email.failure_rate(), 0.02, epsilon = 0.006);

    // A call faults when either channel fails: 1 - 0.98^2 ~= 0.0396.
    let fault_rate = snapshot.backends[&Backend::Notification].fault_rate();
    assert_abs_diff_eq!(fault_rate, 0.0396, epsilon = 0.008);
}

/// The same seed reproduces the same results.
#[test]
fn simulators_are_deterministic_per_seed() {
    let registry = BackendRegistry::default();
    let req = request(Capability::LedgerBalance);

    let mut a = SimRng::from_seed(314);
    let mut b = SimRng::from_seed(314);
    for _ in 0..500 {
        let ra = registry.invoke(&req, &mut a).unwrap();
        let rb = registry.invoke(&req, &mut b).unwrap();
        assert_eq!(ra.latency_ms, rb.latency_ms);
        assert_eq!(ra.status, rb.status);
        assert_eq!(ra.attributes, rb.attributes);
    }
}
