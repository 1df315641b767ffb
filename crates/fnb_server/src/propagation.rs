//! Trace and correlation headers at the HTTP boundary.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use fnb_core::trace::{TraceContext, B3_HEADER, TRACEPARENT_HEADER};
use tracing::debug;

/// Caller-supplied transaction id, echoed on the response.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Context for the entry hop of a request.
///
/// A `b3` header wins over `traceparent`. A malformed header is ignored and
/// the request starts a new trace.
pub fn entry_context(headers: &HeaderMap) -> TraceContext {
    for name in [B3_HEADER, TRACEPARENT_HEADER] {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        match TraceContext::extract(value) {
            Ok(context) => return context,
            Err(err) => debug!(header = name, error = %err, "Ignoring malformed trace header"),
        }
    }
    TraceContext::new_root()
}

/// The `X-Correlation-ID` value, if present and non-blank.
pub fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Headers carried back to the caller: the entry span's `b3` header and the
/// correlation id.
pub fn response_headers(entry: &TraceContext, correlation_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&entry.to_header()) {
        headers.insert(HeaderName::from_static(B3_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    headers
}
