//! The scheduling loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use fnb_core::rng::SimRng;
use fnb_core::trace::TraceContext;
use fnb_core::transaction::{ReconciliationTrigger, Transaction, TransactionType};
use fnb_router::BackpressurePolicy;
use rand::RngCore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LoadGenConfig;
use crate::dispatch::Dispatch;
use crate::error::LoadGenError;
use crate::payloads::PayloadGenerator;
use crate::profile::TrafficProfile;
use crate::stats::LoadGenStats;

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub hour: u32,
    pub window: String,
    /// Types handed to the router, in dispatch order
    pub dispatched: Vec<TransactionType>,
    pub dropped: Vec<TransactionType>,
    /// Sampled wait before the next tick, before scaling
    pub interval: Duration,
}

/// Single-task generator of teller traffic.
pub struct LoadGenerator<D, C> {
    dispatcher: D,
    clock: C,
    profile: TrafficProfile,
    payloads: PayloadGenerator,
    rng: SimRng,
    backpressure: BackpressurePolicy,
    interval_scale: f64,
    start_delay: Duration,
    stats: Arc<LoadGenStats>,
    last_reconciliation: Option<NaiveDate>,
}

impl<D: Dispatch, C: Clock> LoadGenerator<D, C> {
    pub fn new(dispatcher: D, clock: C, config: &LoadGenConfig, rng: SimRng) -> Self {
        Self {
            dispatcher,
            clock,
            profile: config.profile.clone(),
            payloads: PayloadGenerator::default(),
            rng,
            backpressure: config.backpressure,
            interval_scale: config.interval_scale,
            start_delay: Duration::from_secs(config.start_delay_secs),
            stats: Arc::new(LoadGenStats::new()),
            last_reconciliation: None,
        }
    }

    /// Share counters with another owner, e.g. the HTTP stats endpoint.
    pub fn with_stats(mut self, stats: Arc<LoadGenStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<LoadGenStats> {
        self.stats.clone()
    }

    /// Generate and dispatch the transactions for one tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, LoadGenError> {
        let now = self.clock.now();
        let hour = now.hour();
        self.stats.record_tick();

        let mut batch = Vec::with_capacity(2);
        if self.reconciliation_due(now) {
            batch.push(Transaction::reconciliation(
                ReconciliationTrigger::Scheduled,
                self.rng.next_u64(),
            )?);
            self.stats.record_scheduled_reconciliation();
            info!(date = %now.date(), hour, "Nightly reconciliation triggered");
        }

        let kind = self.profile.sample_type(hour, &mut self.rng);
        batch.push(self.payloads.transaction(kind, &mut self.rng)?);

        let window = self.profile.window_for(hour).name.clone();
        let mut outcome = TickOutcome {
            hour,
            window,
            dispatched: Vec::new(),
            dropped: Vec::new(),
            interval: Duration::ZERO,
        };
        for transaction in batch {
            self.submit(transaction, &mut outcome).await?;
        }
        outcome.interval = self.profile.sample_interval(hour, &mut self.rng);

        debug!(
            hour,
            window = %outcome.window,
            dispatched = ?outcome.dispatched,
            interval_ms = outcome.interval.as_millis() as u64,
            "Load generator tick"
        );
        Ok(outcome)
    }

    /// Run `n` ticks back to back, ignoring intervals.
    pub async fn run_ticks(&mut self, n: usize) -> Result<Vec<TickOutcome>, LoadGenError> {
        let mut outcomes = Vec::with_capacity(n);
        for _ in 0..n {
            outcomes.push(self.tick().await?);
        }
        Ok(outcomes)
    }

    /// Tick until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            start_delay_secs = self.start_delay.as_secs(),
            backpressure = %self.backpressure,
            "Load generator starting"
        );
        if !self.pause(self.start_delay, &shutdown).await {
            return;
        }
        info!("Load generator active");

        loop {
            let interval = match self.tick().await {
                Ok(outcome) => outcome.interval,
                Err(err) => {
                    self.stats.record_error();
                    warn!(error = %err, "Load generator tick failed");
                    Duration::from_secs(1)
                }
            };
            let wait = scale(interval, self.interval_scale);
            if !self.pause(wait, &shutdown).await {
                break;
            }
        }
        info!(stats = ?self.stats.snapshot(), "Load generator stopped");
    }

    /// Fires on the first tick inside the reconciliation hour of each day.
    fn reconciliation_due(&mut self, now: NaiveDateTime) -> bool {
        let Some(hour) = self.profile.reconciliation_hour else {
            return false;
        };
        let today = now.date();
        if now.hour() != hour || self.last_reconciliation == Some(today) {
            return false;
        }
        self.last_reconciliation = Some(today);
        true
    }

    async fn submit(
        &self,
        transaction: Transaction,
        outcome: &mut TickOutcome,
    ) -> Result<(), LoadGenError> {
        let kind = transaction.kind();
        let entry = TraceContext::new_root();

        match self.backpressure {
            BackpressurePolicy::Block => {
                self.dispatcher.dispatch(transaction, entry).await?;
            }
            BackpressurePolicy::Drop => {
                if let Err(transaction) = self.dispatcher.try_dispatch(transaction, entry) {
                    self.stats.record_dropped();
                    outcome.dropped.push(kind);
                    warn!(
                        correlation_id = %transaction.id(),
                        transaction_type = %kind,
                        "Router at capacity, dropping transaction"
                    );
                    return Ok(());
                }
            }
        }

        self.stats.record_dispatched(kind);
        outcome.dispatched.push(kind);
        Ok(())
    }

    /// Sleep unless shut down first. Returns `false` on shutdown.
    async fn pause(&self, wait: Duration, shutdown: &CancellationToken) -> bool {
        if wait.is_zero() {
            tokio::task::yield_now().await;
            return !shutdown.is_cancelled();
        }
        tokio::select! {
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

fn scale(interval: Duration, factor: f64) -> Duration {
    if !factor.is_finite() || factor <= 0.0 {
        return Duration::ZERO;
    }
    interval.mul_f64(factor)
}
