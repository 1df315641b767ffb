//! Trace context propagation.
//!
//! A [`TraceContext`] identifies one hop of one transaction. Every hop derives
//! a child context from its caller, so all spans of a transaction share one
//! [`TraceId`] and form a tree through their parent span ids.
//!
//! Contexts cross simulated network hops as a single `b3` header:
//!
//! ```text
//! {trace_id:032x}-{span_id:016x}-{1|0}
//! ```
//!
//! The W3C `traceparent` form (`00-{trace_id}-{span_id}-{flags}`) is accepted
//! on the receiving side as well.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TraceError;

/// Header carrying the single-value B3 encoding.
pub const B3_HEADER: &str = "b3";

/// Header carrying the W3C trace context encoding.
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// 128-bit identifier shared by every span of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

/// 64-bit identifier of a single span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn generate() -> Self {
        // Version 4 UUIDs always carry version bits, so the value is never zero.
        Self(uuid::Uuid::new_v4().as_u128())
    }

    /// Wrap a raw value. Returns `None` for zero, which is reserved as invalid.
    pub fn from_u128(value: u128) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Raw 128-bit value.
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl SpanId {
    /// Generate a span id that is unique within the process.
    ///
    /// Ids come from a process-wide sequence passed through the SplitMix64
    /// finaliser. The finaliser is a bijection on `u64`, so distinct sequence
    /// numbers can never produce the same id.
    pub fn generate() -> Self {
        loop {
            let seq = SPAN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let id = splitmix64(span_salt().wrapping_add(seq));
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Wrap a raw value. Returns `None` for zero.
    pub fn from_u64(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

static SPAN_SEQUENCE: AtomicU64 = AtomicU64::new(0);
static SPAN_SALT: OnceLock<u64> = OnceLock::new();

fn span_salt() -> u64 {
    *SPAN_SALT.get_or_init(|| uuid::Uuid::new_v4().as_u64_pair().1)
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for TraceId {
    type Err = TraceError;

    /// Parses 32 hex characters, or 16 for the legacy 64-bit B3 form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !(s.len() == 32 || s.len() == 16) || !is_hex(s) {
            return Err(TraceError::InvalidTraceId(s.to_string()));
        }
        u128::from_str_radix(s, 16)
            .ok()
            .and_then(Self::from_u128)
            .ok_or_else(|| TraceError::InvalidTraceId(s.to_string()))
    }
}

impl FromStr for SpanId {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 || !is_hex(s) {
            return Err(TraceError::InvalidSpanId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .ok()
            .and_then(Self::from_u64)
            .ok_or_else(|| TraceError::InvalidSpanId(s.to_string()))
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(TraceId);
hex_serde!(SpanId);

/// Identity of one hop of one transaction.
///
/// Contexts are immutable values. A hop never edits the context it received;
/// it derives a child with [`TraceContext::child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<SpanId>,
    sampled: bool,
}

impl TraceContext {
    /// Start a new sampled trace.
    pub fn new_root() -> Self {
        Self::new_root_with_sampling(true)
    }

    /// Start a new trace with an explicit sampling decision.
    pub fn new_root_with_sampling(sampled: bool) -> Self {
        Self {
            trace_id: TraceId::generate(),
            span_id: SpanId::generate(),
            parent_span_id: None,
            sampled,
        }
    }

    /// Derive the context of a hop called by `parent`.
    pub fn child_of(parent: &TraceContext) -> Self {
        Self {
            trace_id: parent.trace_id,
            span_id: SpanId::generate(),
            parent_span_id: Some(parent.span_id),
            sampled: parent.sampled,
        }
    }

    /// Shorthand for [`TraceContext::child_of`].
    pub fn child(&self) -> Self {
        Self::child_of(self)
    }

    /// Trace id shared by every hop of the transaction
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// This hop's span id
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Span id of the calling hop, if any
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.parent_span_id
    }

    /// Whether the trace is sampled for export
    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// True when the context has no parent
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Serialise the context into a `b3` header value.
    pub fn to_header(&self) -> String {
        format!(
            "{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { '1' } else { '0' }
        )
    }

    /// Serialise the context into a W3C `traceparent` header value.
    pub fn to_traceparent(&self) -> String {
        format!(
            "00-{}-{}-{}",
            self.trace_id,
            self.span_id,
            if self.sampled { "01" } else { "00" }
        )
    }

    /// Parse a propagated header back into the sender's context.
    ///
    /// Accepts `b3` values with three fields, or four when the sender
    /// included its own parent span id, and `traceparent` values. The
    /// result carries exactly the sender's trace id, span id and sampling
    /// flag.
    pub fn parse_header(value: &str) -> Result<Self, TraceError> {
        let fields: Vec<&str> = value.trim().split('-').collect();
        match fields.as_slice() {
            [version, trace, span, flags] if version.len() == 2 => {
                Self::parse_traceparent(version, trace, span, flags)
            }
            [trace, span, sampled] => Self::parse_b3(trace, span, sampled, None),
            [trace, span, sampled, parent] => Self::parse_b3(trace, span, sampled, Some(parent)),
            other => Err(TraceError::FieldCount(other.len())),
        }
    }

    /// Build the receiving hop's context from a propagated header.
    ///
    /// The receiver keeps the trace id and sampling flag, takes a fresh span
    /// id, and records the sender's span as its parent.
    pub fn extract(value: &str) -> Result<Self, TraceError> {
        Self::parse_header(value).map(|sender| sender.child())
    }

    fn parse_b3(
        trace: &str,
        span: &str,
        sampled: &str,
        parent: Option<&str>,
    ) -> Result<Self, TraceError> {
        let sampled = match sampled {
            "1" | "d" => true,
            "0" => false,
            other => return Err(TraceError::InvalidSampled(other.to_string())),
        };
        let parent_span_id = parent.map(SpanId::from_str).transpose()?;
        Ok(Self {
            trace_id: trace.parse()?,
            span_id: span.parse()?,
            parent_span_id,
            sampled,
        })
    }

    fn parse_traceparent(
        version: &str,
        trace: &str,
        span: &str,
        flags: &str,
    ) -> Result<Self, TraceError> {
        if version != "00" {
            return Err(TraceError::UnsupportedVersion(version.to_string()));
        }
        if trace.len() != 32 {
            return Err(TraceError::InvalidTraceId(trace.to_string()));
        }
        if flags.len() != 2 || !is_hex(flags) {
            return Err(TraceError::InvalidSampled(flags.to_string()));
        }
        let flags = u8::from_str_radix(flags, 16)
            .map_err(|_| TraceError::InvalidSampled(flags.to_string()))?;
        Ok(Self {
            trace_id: trace.parse()?,
            span_id: span.parse()?,
            parent_span_id: None,
            sampled: flags & 0x01 == 0x01,
        })
    }
}
