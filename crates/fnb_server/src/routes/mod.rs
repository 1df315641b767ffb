//! Route modules for the simulator server
//!
//! - payments: wire and ACH payment triggers
//! - customers: customer 360 lookups
//! - accounts: account opening with KYC
//! - reconciliation: on-demand trade reconciliation
//! - admin: counters and demo reset
//! - health: health, readiness and metrics endpoints

pub mod accounts;
pub mod admin;
pub mod customers;
pub mod flow;
pub mod health;
pub mod payments;
pub mod reconciliation;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::Router;
use fnb_backends::BackendRegistry;
use fnb_core::rng::SimRng;
use fnb_core::span::{SpanSink, TracingSpanSink};
use fnb_loadgen::LoadGenStats;
use fnb_router::{FlowRouter, RouterError};
use metrics_exporter_prometheus::PrometheusHandle;
use rand::RngCore;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub router: FlowRouter,
    /// Counters of the background load generator, if one runs
    pub loadgen: Arc<LoadGenStats>,
    /// Prometheus render handle when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Server start time for uptime calculation
    pub start_time: Instant,
    seeds: Arc<Mutex<SimRng>>,
}

impl AppState {
    /// Build the simulators and router, logging spans through `tracing`.
    pub fn new(config: Arc<AppConfig>) -> Result<Self, RouterError> {
        Self::with_sink(config, Arc::new(TracingSpanSink))
    }

    /// Build the simulators and router with a custom span sink.
    pub fn with_sink(config: Arc<AppConfig>, sink: Arc<dyn SpanSink>) -> Result<Self, RouterError> {
        let backends = Arc::new(BackendRegistry::new(config.backends.clone()));
        let router = FlowRouter::new(config.router.clone(), backends, sink)?;
        let seed = config.seed.unwrap_or_else(rand::random);

        Ok(Self {
            config,
            router,
            loadgen: Arc::new(LoadGenStats::new()),
            metrics: None,
            start_time: Instant::now(),
            seeds: Arc::new(Mutex::new(SimRng::from_seed(seed))),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Seed for the next HTTP-triggered transaction
    pub fn next_seed(&self) -> u64 {
        self.seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_u64()
    }

    /// An independent generator derived from the root seed
    pub fn fork_rng(&self) -> SimRng {
        self.seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fork()
    }
}

/// Build the main application router by merging all route modules
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(payments::routes())
        .merge(customers::routes())
        .merge(accounts::routes())
        .merge(reconciliation::routes())
        .merge(admin::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
