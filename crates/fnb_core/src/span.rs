//! Span records, attributes and span sinks.
//!
//! Spans are collected per transaction and handed to a [`SpanSink`] once the
//! transaction finishes. Shipping spans to a telemetry backend is the sink's
//! concern; the simulation only produces well-formed records.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::trace::{SpanId, TraceContext, TraceId};

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String value
    Str(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<u32> for AttributeValue {
    fn from(v: u32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<usize> for AttributeValue {
    fn from(v: usize) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

/// Ordered string-keyed attribute map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, AttributeValue>);

impl Attributes {
    /// Empty attribute map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an attribute.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`Attributes::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value lookup
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    /// String value, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttributeValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Boolean value, if present and a boolean
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(AttributeValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Integer value, if present and an integer
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(AttributeValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, widening integers to `f64`
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(AttributeValue::Float(f)) => Some(*f),
            Some(AttributeValue::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    /// True when the key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every attribute of `other` into `self`, overwriting duplicates.
    pub fn extend(&mut self, other: &Attributes) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Role of a span within its hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Work inside one component
    Internal,
    /// Outbound call to another component
    Client,
    /// Handling of an inbound call
    Server,
}

/// Completion status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A finished span.
///
/// Times are offsets in simulated milliseconds from the start of the
/// transaction, so a record describes the simulated timeline regardless of
/// how fast the simulation actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start_offset_ms: u64,
    pub duration_ms: u64,
    pub status: SpanStatus,
    pub attributes: Attributes,
}

impl SpanRecord {
    /// Start a record for the hop identified by `ctx`.
    pub fn new(ctx: &TraceContext, name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            trace_id: ctx.trace_id(),
            span_id: ctx.span_id(),
            parent_span_id: ctx.parent_span_id(),
            name: name.into(),
            kind,
            start_offset_ms: 0,
            duration_ms: 0,
            status: SpanStatus::Ok,
            attributes: Attributes::new(),
        }
    }

    /// Set the simulated start offset and duration.
    pub fn timed(mut self, start_offset_ms: u64, duration_ms: u64) -> Self {
        self.start_offset_ms = start_offset_ms;
        self.duration_ms = duration_ms;
        self
    }

    /// Set the status.
    pub fn with_status(mut self, status: SpanStatus) -> Self {
        self.status = status;
        self
    }

    /// Replace the attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Simulated end offset
    pub fn end_offset_ms(&self) -> u64 {
        self.start_offset_ms + self.duration_ms
    }
}

/// Destination for finished spans.
pub trait SpanSink: Send + Sync {
    /// Record one finished span.
    fn record(&self, span: &SpanRecord);

    /// Record every span of one transaction.
    fn record_all(&self, spans: &[SpanRecord]) {
        for span in spans {
            self.record(span);
        }
    }
}

/// Emits each span as a structured `tracing` event on target `fnb::span`.
///
/// A collector subscribed to that target can forward the events to any
/// telemetry backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpanSink;

impl SpanSink for TracingSpanSink {
    fn record(&self, span: &SpanRecord) {
        let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
        tracing::info!(
            target: "fnb::span",
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = ?span.parent_span_id.map(|id| id.to_string()),
            name = %span.name,
            kind = ?span.kind,
            start_offset_ms = span.start_offset_ms,
            duration_ms = span.duration_ms,
            status = ?span.status,
            attributes = %attributes,
            "span"
        );
    }
}

/// Discards every span.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSpanSink;

impl SpanSink for NoopSpanSink {
    fn record(&self, _span: &SpanRecord) {}
}

/// Keeps spans in memory, mainly for tests.
#[derive(Debug, Default)]
pub struct MemorySpanSink {
    spans: Mutex<Vec<SpanRecord>>,
}

impl MemorySpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded span
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Spans belonging to one trace
    pub fn by_trace(&self, trace_id: TraceId) -> Vec<SpanRecord> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.trace_id == trace_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanSink for MemorySpanSink {
    fn record(&self, span: &SpanRecord) {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span.clone());
    }
}
