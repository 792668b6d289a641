//! HTTP middleware.

pub mod trace;

pub use trace::{route_span, server_span, HttpTracing, RequestTrace, SERVER_OPERATION};
