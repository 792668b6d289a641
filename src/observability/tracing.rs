//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract W3C trace context from incoming request headers
//! - Guarantee spans are ended exactly once on every exit path

use axum::http::HeaderMap;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::Context;

/// Reads propagation fields from HTTP headers.
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// Owns a context whose active span is ended when the guard drops.
///
/// Covers normal return, early return, cancellation of the owning future and
/// unwinding. Ending is idempotent in the SDK, so an explicit `end` on the
/// span before the drop does not produce a second record.
#[derive(Debug)]
pub struct SpanGuard {
    cx: Context,
}

impl SpanGuard {
    /// Take ownership of `cx`, which must carry the span to end.
    pub fn new(cx: Context) -> Self {
        Self { cx }
    }

    /// Context carrying the guarded span, for parenting children.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}
