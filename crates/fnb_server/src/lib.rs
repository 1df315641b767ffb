//! HTTP trigger surface for the FNB transaction simulator
//!
//! This crate exposes the payment, customer 360, account opening and
//! reconciliation flows over HTTP, runs the time-of-day load generator
//! against the same router, and reports counters for the whole simulation.
//!
//! Incoming `b3` or `traceparent` headers are honoured as the caller's
//! context; every response carries the entry span's `b3` header and the
//! transaction's `X-Correlation-ID`.

pub mod config;
pub mod error;
pub mod propagation;
pub mod routes;
pub mod server;

pub use config::{build_config, AppConfig, CliArgs, ConfigError};
pub use error::ApiError;
pub use routes::{build_router, AppState};
pub use server::{shutdown_signal, Server};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
