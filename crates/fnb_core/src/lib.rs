//! # fnb_core: Foundation for the FNB transaction simulation
//!
//! ## Layer 1 (Foundation) Role
//!
//! fnb_core is the bottom layer of the workspace, providing:
//! - Trace context generation and header propagation (`trace`)
//! - Span records, attributes and span sinks (`span`)
//! - The seeded random source every simulator draws from (`rng`)
//! - Transaction types and validated payloads (`transaction`)
//! - Error types: `TraceError`, `ValidationError` (`error`)
//!
//! It has no dependency on other fnb_* crates.
//!
//! ## Usage Examples
//!
//! ```rust
//! use fnb_core::trace::TraceContext;
//!
//! let portal = TraceContext::new_root();
//! let header = portal.to_header();
//!
//! // The receiving hop derives its own context from the header.
//! let integration = TraceContext::extract(&header).unwrap();
//! assert_eq!(integration.trace_id(), portal.trace_id());
//! assert_eq!(integration.parent_span_id(), Some(portal.span_id()));
//! ```

pub mod error;
pub mod rng;
pub mod span;
pub mod trace;
pub mod transaction;

pub use error::{TraceError, ValidationError};

/// Commonly used types
pub mod prelude {
    pub use crate::error::{TraceError, ValidationError};
    pub use crate::rng::{LatencyRange, SimRng};
    pub use crate::span::{
        AttributeValue, Attributes, MemorySpanSink, NoopSpanSink, SpanKind, SpanRecord,
        SpanSink, SpanStatus, TracingSpanSink,
    };
    pub use crate::trace::{SpanId, TraceContext, TraceId, B3_HEADER, TRACEPARENT_HEADER};
    pub use crate::transaction::{
        AccountOpenRequest, CustomerLookup, PaymentRequest, ReconciliationTrigger, Transaction,
        TransactionPayload, TransactionType,
    };
}
