//! # fnb_backends: Simulated systems of record
//!
//! Five simulators stand in for the bank's backends:
//! - `ledger`: core banking database with slow query injection
//! - `fraud`: fraud scoring model with a high-risk threshold
//! - `screening`: AML/KYC watchlist screening with OFAC hard hits
//! - `profile`: customer profile CRM
//! - `notification`: SMS and email delivery with per-channel failures
//!
//! All share one contract: take a [`BackendRequest`] carrying the propagated
//! trace header plus an injected [`fnb_core::rng::SimRng`], and return a
//! [`BackendCallResult`] with sampled latency, status and span attributes.
//! Latency is returned as data; waiting for it is the caller's job.

pub mod call;
pub mod capability;
pub mod config;
pub mod error;
pub mod registry;
pub mod simulators;
pub mod stats;

pub use call::{BackendCallResult, BackendRequest, CallStatus, FaultKind};
pub use capability::{Backend, Capability};
pub use config::BackendsConfig;
pub use error::BackendError;
pub use registry::{BackendRegistry, RegistrySnapshot};

/// Commonly used types
pub mod prelude {
    pub use crate::call::{BackendCallResult, BackendRequest, CallStatus, FaultKind};
    pub use crate::capability::{Backend, Capability};
    pub use crate::config::{
        BackendsConfig, FraudConfig, LedgerConfig, NotificationConfig, ProfileConfig,
        ScreeningConfig,
    };
    pub use crate::error::BackendError;
    pub use crate::registry::{BackendRegistry, RegistrySnapshot};
    pub use crate::simulators::{BackendSimulator, Channel};
    pub use crate::stats::{ChannelSnapshot, StatsSnapshot};
}
