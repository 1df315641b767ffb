//! # fnb_loadgen: Teller traffic generator
//!
//! A single scheduling loop that, at every tick, reads the wall clock,
//! samples a transaction type and a wait interval from the time-of-day
//! [`TrafficProfile`], builds the transaction with a fresh root trace
//! context and hands it to the flow router.
//!
//! - `profile`: traffic windows, burst hours and the operation mix
//! - `payloads`: synthetic wires, ACH payments, lookups and applications
//! - `clock`: injectable wall clock (`SystemClock`, `FixedClock`)
//! - `dispatch`: the seam to the router, with blocking and dropping modes
//! - `generator`: the loop itself, including the nightly reconciliation
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fnb_backends::BackendRegistry;
//! use fnb_core::rng::SimRng;
//! use fnb_core::span::TracingSpanSink;
//! use fnb_loadgen::{LoadGenConfig, LoadGenerator, SystemClock};
//! use fnb_router::{FlowRouter, RouterConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), fnb_router::RouterError> {
//! let router = FlowRouter::new(
//!     RouterConfig::default(),
//!     Arc::new(BackendRegistry::default()),
//!     Arc::new(TracingSpanSink),
//! )?;
//! let generator = LoadGenerator::new(
//!     router,
//!     SystemClock,
//!     &LoadGenConfig::default(),
//!     SimRng::from_seed(42),
//! );
//! generator.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod generator;
pub mod payloads;
pub mod profile;
pub mod stats;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LoadGenConfig;
pub use dispatch::Dispatch;
pub use error::LoadGenError;
pub use generator::{LoadGenerator, TickOutcome};
pub use payloads::PayloadGenerator;
pub use profile::{IntervalRange, OperationMix, TrafficProfile, TrafficWindow};
pub use stats::{LoadGenSnapshot, LoadGenStats};
