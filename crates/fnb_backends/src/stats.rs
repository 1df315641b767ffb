//! Call counters shared across concurrent invocations.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::call::{BackendCallResult, CallStatus};

/// Monotonic per-simulator counters.
#[derive(Debug, Default)]
pub struct SimulatorStats {
    calls: AtomicU64,
    faults: AtomicU64,
    rejections: AtomicU64,
}

impl SimulatorStats {
    /// Count one finished call.
    pub fn record(&self, result: &BackendCallResult) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match result.status {
            CallStatus::Ok => {}
            CallStatus::Fault => {
                self.faults.fetch_add(1, Ordering::Relaxed);
            }
            CallStatus::Rejected => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SimulatorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub calls: u64,
    pub faults: u64,
    pub rejections: u64,
}

impl StatsSnapshot {
    /// Share of calls that faulted
    pub fn fault_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.faults as f64 / self.calls as f64
        }
    }

    /// Share of calls that were rejected
    pub fn rejection_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.rejections as f64 / self.calls as f64
        }
    }
}

/// Delivery attempts and failures for one notification channel.
#[derive(Debug, Default)]
pub struct ChannelStats {
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl ChannelStats {
    pub fn record(&self, delivered: bool) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if !delivered {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub attempts: u64,
    pub failures: u64,
}

impl ChannelSnapshot {
    pub fn failure_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.failures as f64 / self.attempts as f64
        }
    }
}
