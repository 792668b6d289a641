//! Request tracing middleware.
//!
//! Two layers cooperate so every request gets a span without handler help:
//!
//! ```text
//! server_span  (SpanKind::Server, named by the operation, every request)
//!   └─ route_span  (named by the matched route pattern, routed requests only)
//!        └─ handler spans (e.g. "roll")
//! ```
//!
//! Each layer puts its context into the request extensions as a
//! [`RequestTrace`]; the inner span always ends before the outer one.

use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::Tracer;
use std::borrow::Cow;
use std::convert::Infallible;

use crate::observability::{HeaderExtractor, SpanGuard, Telemetry, INSTRUMENTATION_NAME};

/// Operation name for the server-level span.
pub const SERVER_OPERATION: &str = "/";

/// Trace context of the innermost instrumentation layer for this request.
///
/// As an extractor it yields an empty context when the request did not pass
/// through the tracing middleware.
#[derive(Debug, Clone)]
pub struct RequestTrace(pub Context);

impl<S> FromRequestParts<S> for RequestTrace
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestTrace>()
            .cloned()
            .unwrap_or_else(|| RequestTrace(Context::new())))
    }
}

/// State shared by both tracing layers.
#[derive(Debug, Clone)]
pub struct HttpTracing {
    telemetry: Telemetry,
    tracer: Tracer,
    operation: Cow<'static, str>,
}

impl HttpTracing {
    pub fn new(telemetry: &Telemetry, operation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            telemetry: telemetry.clone(),
            tracer: telemetry.tracer(INSTRUMENTATION_NAME),
            operation: operation.into(),
        }
    }
}

/// Outermost layer: one server span per request, parented on any remote
/// context found in the headers.
pub async fn server_span(
    State(http_tracing): State<HttpTracing>,
    mut request: Request,
    next: Next,
) -> Response {
    let parent = http_tracing
        .telemetry
        .propagator()
        .extract(&HeaderExtractor(request.headers()));

    let span = http_tracing
        .tracer
        .span_builder(http_tracing.operation.clone())
        .with_kind(SpanKind::Server)
        .with_attributes([
            KeyValue::new("http.request.method", request.method().to_string()),
            KeyValue::new("url.path", request.uri().path().to_string()),
        ])
        .start_with_context(&http_tracing.tracer, &parent);
    let guard = SpanGuard::new(parent.with_span(span));

    request
        .extensions_mut()
        .insert(RequestTrace(guard.context().clone()));
    let response = next.run(request).await;

    let status = response.status();
    let span = guard.context().span();
    span.set_attribute(KeyValue::new(
        "http.response.status_code",
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }

    response
}

/// Per-route layer: a child span named after the matched pattern.
///
/// Also tags the server span with `http.route`, which is only known once
/// routing has happened.
pub async fn route_span(
    State(http_tracing): State<HttpTracing>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(route) = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
    else {
        return next.run(request).await;
    };

    let parent = request
        .extensions()
        .get::<RequestTrace>()
        .map(|trace| trace.0.clone())
        .unwrap_or_else(Context::new);
    parent
        .span()
        .set_attribute(KeyValue::new("http.route", route.clone()));

    let span = http_tracing
        .tracer
        .span_builder(route.clone())
        .with_kind(SpanKind::Internal)
        .with_attributes([KeyValue::new("http.route", route)])
        .start_with_context(&http_tracing.tracer, &parent);
    let guard = SpanGuard::new(parent.with_span(span));

    request
        .extensions_mut()
        .insert(RequestTrace(guard.context().clone()));
    next.run(request).await
}
