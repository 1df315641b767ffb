//! # fnb_router: Integration-layer flow router
//!
//! ## Layer 3 (Orchestration) Role
//!
//! fnb_router sits between the entry points and the backends, providing:
//! - Flow definitions as data, grouped into sequential steps and
//!   scatter-gather stages (`flow`)
//! - The per-transaction state machine (`state`)
//! - Flow execution with simulated latency, per-step and per-branch
//!   timeouts, reject short-circuits and span emission (`engine`)
//! - Admission under an in-flight cap, cancellation by correlation id and an
//!   idempotent result cache (`router`)
//!
//! ## Usage Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use fnb_backends::BackendRegistry;
//! use fnb_core::span::TracingSpanSink;
//! use fnb_core::trace::TraceContext;
//! use fnb_core::transaction::Transaction;
//! use fnb_router::{FlowRouter, RouterConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let router = FlowRouter::new(
//!     RouterConfig::default(),
//!     Arc::new(BackendRegistry::default()),
//!     Arc::new(TracingSpanSink),
//! )?;
//!
//! let tx = Transaction::customer_360("CUST000042", 7)?;
//! let result = router.execute(tx, TraceContext::new_root()).await?;
//! println!("{} in {} ms", result.outcome, result.total_latency_ms);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod result;
pub mod router;
pub mod state;

pub use config::{BackpressurePolicy, RouterConfig};
pub use error::RouterError;
pub use flow::{FlowCatalog, FlowDefinition, FlowStep};
pub use result::FlowResult;
pub use router::{AdmissionPermit, FlowRouter, RouterCounters};
pub use state::{FlowOutcome, FlowState};

/// Commonly used types
pub mod prelude {
    pub use crate::config::{BackpressurePolicy, RouterConfig};
    pub use crate::error::RouterError;
    pub use crate::flow::{
        AfterReject, Branch, ExecutionMode, FlowCatalog, FlowDefinition, FlowStep, Stage,
    };
    pub use crate::result::FlowResult;
    pub use crate::router::{AdmissionPermit, FlowRouter, RouterCounters};
    pub use crate::state::{FlowOutcome, FlowState};
}
