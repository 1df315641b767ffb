//! Load generator counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use fnb_core::transaction::TransactionType;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct LoadGenStats {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
    scheduled_reconciliations: AtomicU64,
    by_type: [AtomicU64; 5],
}

impl LoadGenStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, kind: TransactionType) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.by_type[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scheduled_reconciliation(&self) {
        self.scheduled_reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoadGenSnapshot {
        LoadGenSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            scheduled_reconciliations: self.scheduled_reconciliations.load(Ordering::Relaxed),
            by_type: TransactionType::ALL
                .iter()
                .map(|&t| (t, self.by_type[t.index()].load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadGenSnapshot {
    pub ticks: u64,
    pub dispatched: u64,
    pub dropped: u64,
    pub errors: u64,
    pub scheduled_reconciliations: u64,
    pub by_type: BTreeMap<TransactionType, u64>,
}

impl LoadGenSnapshot {
    pub fn count(&self, kind: TransactionType) -> u64 {
        self.by_type.get(&kind).copied().unwrap_or(0)
    }
}
