//! Core banking ledger simulator.
//!
//! Every ledger operation is a database round trip that can hit table lock
//! contention on `accounts_ledger`, turning a 150-200 ms query into a
//! 4-5.5 second one.

use fnb_core::rng::SimRng;
use fnb_core::span::Attributes;
use tracing::{debug, warn};

use crate::call::{BackendCallResult, BackendRequest, FaultKind};
use crate::capability::{Backend, Capability};
use crate::config::LedgerConfig;
use crate::error::BackendError;
use crate::stats::SimulatorStats;

use super::{ensure_owned, server_context};

/// Table touched by lock contention
pub const CONTENDED_TABLE: &str = "accounts_ledger";

#[derive(Debug, Default)]
pub struct LedgerSimulator {
    config: LedgerConfig,
    stats: SimulatorStats,
}

impl LedgerSimulator {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            stats: SimulatorStats::default(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn invoke(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
    ) -> Result<BackendCallResult, BackendError> {
        ensure_owned(Backend::Ledger, request.capability)?;
        let context = server_context(request)?;

        let (table, operation) = table_for(request.capability);
        let mut attributes = Attributes::new()
            .with("db.system", "oracle")
            .with("db.name", "FNBPROD")
            .with("db.operation", operation)
            .with("db.sql.table", table);

        if rng.bernoulli(self.config.unavailable_rate) {
            let latency = rng.latency(self.config.latency);
            attributes
                .set("error.type", "ORA-12541")
                .set("error.message", "TNS:no listener");
            warn!(
                correlation_id = %request.correlation_id,
                capability = %request.capability,
                "Ledger unavailable"
            );
            let result = BackendCallResult::ok(&request.step, request.capability, context, latency)
                .with_attributes(attributes)
                .with_fault(FaultKind::Unavailable);
            self.stats.record(&result);
            return Ok(result);
        }

        let slow = rng.bernoulli(self.config.slow_query_rate);
        let latency = if slow {
            rng.latency(self.config.slow_latency)
        } else {
            rng.latency(self.config.latency)
        };

        self.operation_attributes(request, rng, &mut attributes);
        attributes.set("slow_query", slow);

        let mut result = BackendCallResult::ok(&request.step, request.capability, context, latency);
        if slow {
            attributes
                .set("db.sql.table", CONTENDED_TABLE)
                .set("slow_query.reason", "table_lock_contention")
                .set("slow_query.threshold_ms", self.config.slow_query_threshold_ms)
                .set("slow_query.actual_ms", latency);
            warn!(
                correlation_id = %request.correlation_id,
                table = CONTENDED_TABLE,
                operation,
                duration_ms = latency,
                threshold_ms = self.config.slow_query_threshold_ms,
                reason = "table_lock_contention",
                "Slow query detected"
            );
            result = result.with_fault(FaultKind::SlowQuery);
        } else {
            debug!(
                correlation_id = %request.correlation_id,
                table,
                operation,
                duration_ms = latency,
                "Ledger query"
            );
        }

        let result = result.with_attributes(attributes);
        self.stats.record(&result);
        Ok(result)
    }

    fn operation_attributes(
        &self,
        request: &BackendRequest,
        rng: &mut SimRng,
        attributes: &mut Attributes,
    ) {
        if let Some(account) = request.fields.get_str("account.id") {
            attributes.set("account.id", account);
        }

        match request.capability {
            Capability::LedgerBalance => {
                // Log-normal balances: median around 3,000 with a long right tail.
                let balance = (8.0 + 1.2 * rng.gen_normal()).exp();
                attributes
                    .set("account.balance", round2(balance))
                    .set("account.currency", "USD");
            }
            Capability::LedgerTransactions => {
                attributes.set("transactions.count", rng.int_inclusive(5, 50));
            }
            Capability::LedgerDebit => {
                if let Some(amount) = request.fields.get_f64("transaction.amount") {
                    attributes.set("transaction.amount", amount);
                }
                attributes.set(
                    "ledger.transaction_id",
                    format!("TXN{:010}", rng.int_inclusive(0, 9_999_999_999)),
                );
            }
            Capability::LedgerCreateAccount => {
                attributes.set(
                    "account.id",
                    format!("ACC{:08}", rng.int_inclusive(1, 99_999_999)),
                );
                if let Some(kind) = request.fields.get_str("account.type") {
                    attributes.set("account.type", kind);
                }
            }
            Capability::LedgerTradePositions => {
                let positions = rng.int_inclusive(200, 800);
                let matched = (positions as f64 * rng.uniform(0.92, 0.98)).round() as u64;
                let breaks = positions.saturating_sub(matched);
                attributes
                    .set("recon.positions", positions)
                    .set("recon.matched", matched)
                    .set("recon.breaks", breaks)
                    .set("recon.match_rate", round2(matched as f64 / positions as f64 * 100.0));
            }
            _ => {}
        }
    }
}

fn table_for(capability: Capability) -> (&'static str, &'static str) {
    match capability {
        Capability::LedgerBalance => ("accounts", "SELECT"),
        Capability::LedgerTransactions => ("transactions", "SELECT"),
        Capability::LedgerDebit => (CONTENDED_TABLE, "UPDATE"),
        Capability::LedgerCreateAccount => ("accounts", "INSERT"),
        Capability::LedgerTradePositions => ("trade_positions", "SELECT"),
        _ => ("", ""),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
