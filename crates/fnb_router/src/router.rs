//! Flow router: admission, cancellation, idempotent results and counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use fnb_backends::BackendRegistry;
use fnb_core::span::SpanSink;
use fnb_core::trace::TraceContext;
use fnb_core::transaction::Transaction;
use serde::Serialize;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::engine::FlowExecution;
use crate::error::RouterError;
use crate::flow::FlowCatalog;
use crate::result::FlowResult;
use crate::state::FlowOutcome;

/// A slot under the in-flight cap. The slot frees when the permit drops.
#[derive(Debug)]
pub struct AdmissionPermit(OwnedSemaphorePermit);

/// Outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterCounters {
    pub completed: u64,
    pub rejected: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub cache_hits: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    cache_hits: AtomicU64,
}

/// Bounded map of finished results, evicting the oldest first.
#[derive(Debug)]
struct ResultCache {
    capacity: usize,
    results: HashMap<String, FlowResult>,
    order: VecDeque<String>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            results: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, id: &str) -> Option<FlowResult> {
        self.results.get(id).cloned()
    }

    fn insert(&mut self, result: FlowResult) {
        if self.capacity == 0 {
            return;
        }
        let id = result.correlation_id.clone();
        if self.results.insert(id.clone(), result).is_some() {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.results.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.results.len()
    }
}

/// The single run in progress for one correlation id.
///
/// Callers arriving while it runs subscribe to `result` instead of starting
/// a second run.
#[derive(Debug)]
struct ActiveEntry {
    token: CancellationToken,
    result: watch::Sender<Option<FlowResult>>,
}

/// Outcome of claiming a correlation id.
enum Claim {
    /// No run in progress; this caller executes the flow
    Run(CancellationToken),
    /// Another caller is running it. `stale` is set when that run was
    /// already cancelled at the time of joining.
    Join {
        result: watch::Receiver<Option<FlowResult>>,
        stale: bool,
    },
}

/// Removes the active entry when the running caller finishes or is dropped.
struct InFlight<'a> {
    router: &'a FlowRouter,
    correlation_id: &'a str,
    released: bool,
}

impl InFlight<'_> {
    /// Hand the result to every caller that joined this run.
    fn publish(mut self, result: &FlowResult) {
        // Released exactly once; a later claim of the same id is not ours.
        self.released = true;
        if let Some(entry) = self.router.release(self.correlation_id) {
            entry.result.send_replace(Some(result.clone()));
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.router.release(self.correlation_id);
        }
    }
}

struct RouterInner {
    config: RouterConfig,
    catalog: FlowCatalog,
    backends: Arc<BackendRegistry>,
    sink: Arc<dyn SpanSink>,
    permits: Arc<Semaphore>,
    active: Mutex<HashMap<String, ActiveEntry>>,
    cache: Mutex<ResultCache>,
    counters: Counters,
}

/// Routes transactions through their flows.
///
/// Cheap to clone; clones share admission, caches and counters.
#[derive(Clone)]
pub struct FlowRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for FlowRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRouter")
            .field("config", &self.inner.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl FlowRouter {
    /// Build a router over the standard flow catalog.
    pub fn new(
        config: RouterConfig,
        backends: Arc<BackendRegistry>,
        sink: Arc<dyn SpanSink>,
    ) -> Result<Self, RouterError> {
        let catalog = FlowCatalog::standard(&config);
        catalog.validate()?;

        Ok(Self {
            inner: Arc::new(RouterInner {
                permits: Arc::new(Semaphore::new(config.max_in_flight)),
                cache: Mutex::new(ResultCache::new(config.result_cache_size)),
                active: Mutex::new(HashMap::new()),
                counters: Counters::default(),
                config,
                catalog,
                backends,
                sink,
            }),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.inner.catalog
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.inner.backends
    }

    /// In-flight cap
    pub fn capacity(&self) -> usize {
        self.inner.config.max_in_flight
    }

    /// Transactions currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.capacity()
            .saturating_sub(self.inner.permits.available_permits())
    }

    /// Take a slot if one is free.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        self.inner
            .permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(AdmissionPermit)
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<AdmissionPermit, RouterError> {
        self.inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map(AdmissionPermit)
            .map_err(|_| RouterError::AdmissionClosed)
    }

    /// Stop admitting. Waiters in [`FlowRouter::admit`] get
    /// [`RouterError::AdmissionClosed`].
    pub fn close(&self) {
        self.inner.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Admit and run a transaction, waiting for a slot if needed.
    ///
    /// A correlation id that already has a cached result returns that result
    /// without invoking any backend.
    pub async fn execute(
        &self,
        transaction: Transaction,
        entry: TraceContext,
    ) -> Result<FlowResult, RouterError> {
        if let Some(hit) = self.cache_lookup(transaction.id()) {
            return Ok(hit);
        }
        let permit = self.admit().await?;
        self.execute_admitted(permit, transaction, entry).await
    }

    /// Run a transaction only if a slot is free right now.
    ///
    /// `Ok(None)` means the router is at capacity and nothing ran. Cached
    /// results are returned even when the router is full.
    pub async fn try_execute(
        &self,
        transaction: Transaction,
        entry: TraceContext,
    ) -> Result<Option<FlowResult>, RouterError> {
        if let Some(hit) = self.cache_lookup(transaction.id()) {
            return Ok(Some(hit));
        }
        match self.try_admit() {
            Some(permit) => self
                .execute_admitted(permit, transaction, entry)
                .await
                .map(Some),
            None => Ok(None),
        }
    }

    /// Run a transaction that already holds a slot.
    ///
    /// At most one run per correlation id is in progress. A caller arriving
    /// while it runs waits for that run's result, so an overlapping retry
    /// never invokes a backend twice.
    pub async fn execute_admitted(
        &self,
        permit: AdmissionPermit,
        transaction: Transaction,
        entry: TraceContext,
    ) -> Result<FlowResult, RouterError> {
        let _permit = permit;
        let definition = self.inner.catalog.definition(transaction.kind())?;
        let correlation_id = transaction.id();

        loop {
            if let Some(hit) = self.cache_lookup(correlation_id) {
                return Ok(hit);
            }

            let token = match self.claim(correlation_id) {
                Claim::Run(token) => token,
                Claim::Join { mut result, stale } => {
                    let shared = result
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|r| r.as_ref().cloned());
                    match shared {
                        // Joined after cancellation: the caller asked for a
                        // fresh run, not the cancelled one.
                        Some(result) if !(stale && result.is_cancelled()) => {
                            self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                            debug!(
                                correlation_id,
                                trace_id = %result.trace_id,
                                "Joined in-flight run"
                            );
                            return Ok(result);
                        }
                        _ => continue,
                    }
                }
            };

            let in_flight = InFlight {
                router: self,
                correlation_id,
                released: false,
            };
            let result = FlowExecution::new(
                &self.inner.backends,
                &definition,
                &transaction,
                self.inner.config.latency_scale,
                &token,
            )
            .run(entry)
            .await?;

            self.inner.sink.record_all(&result.spans);
            self.record_outcome(&result);
            in_flight.publish(&result);
            return Ok(result);
        }
    }

    /// Run an admitted transaction on its own task.
    pub fn spawn(
        &self,
        permit: AdmissionPermit,
        transaction: Transaction,
        entry: TraceContext,
    ) -> JoinHandle<Result<FlowResult, RouterError>> {
        let router = self.clone();
        tokio::spawn(async move { router.execute_admitted(permit, transaction, entry).await })
    }

    /// Cancel the in-flight transaction with this correlation id.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        match active.get(correlation_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight transaction. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        for entry in active.values() {
            entry.token.cancel();
        }
        active.len()
    }

    /// Cached result for a correlation id
    pub fn cached(&self, correlation_id: &str) -> Option<FlowResult> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(correlation_id)
    }

    pub fn cached_results(&self) -> usize {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn counters(&self) -> RouterCounters {
        let c = &self.inner.counters;
        RouterCounters {
            completed: c.completed.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }

    fn cache_lookup(&self, correlation_id: &str) -> Option<FlowResult> {
        let hit = self.cached(correlation_id)?;
        self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        Some(hit)
    }

    fn claim(&self, correlation_id: &str) -> Claim {
        let mut active = self.inner.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = active.get(correlation_id) {
            return Claim::Join {
                result: entry.result.subscribe(),
                stale: entry.token.is_cancelled(),
            };
        }
        let token = CancellationToken::new();
        let (result, _) = watch::channel(None);
        active.insert(
            correlation_id.to_string(),
            ActiveEntry {
                token: token.clone(),
                result,
            },
        );
        Claim::Run(token)
    }

    fn release(&self, correlation_id: &str) -> Option<ActiveEntry> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(correlation_id)
    }

    fn record_outcome(&self, result: &FlowResult) {
        let counters = &self.inner.counters;
        let cancelled = result.is_cancelled();

        match result.outcome {
            FlowOutcome::Completed => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    correlation_id = %result.correlation_id,
                    flow = %result.flow_name,
                    trace_id = %result.trace_id,
                    latency_ms = result.total_latency_ms,
                    "Flow completed"
                );
            }
            FlowOutcome::Rejected => {
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                info!(
                    correlation_id = %result.correlation_id,
                    flow = %result.flow_name,
                    trace_id = %result.trace_id,
                    reason = result.reason.as_deref().unwrap_or_default(),
                    "Flow rejected"
                );
            }
            FlowOutcome::Failed => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                if cancelled {
                    counters.cancelled.fetch_add(1, Ordering::Relaxed);
                }
                warn!(
                    correlation_id = %result.correlation_id,
                    flow = %result.flow_name,
                    trace_id = %result.trace_id,
                    reason = result.reason.as_deref().unwrap_or_default(),
                    "Flow failed"
                );
            }
        }

        // A cancelled run is not an answer; a retry should execute again.
        if !cancelled {
            self.inner
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(result.clone());
        }
    }
}
