//! Dice service instrumented with OpenTelemetry.
//!
//! Serves `/`, `/dice` and `/dice/{player}`. Every request produces a server
//! span, a route span and, for dice rolls, a `roll` span, a `dice.rolls`
//! counter increment and a log record, all sharing the request's trace id.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use http::{build_app, routes, HttpServer};
pub use lifecycle::{Lifecycle, LifecycleState, Shutdown};
pub use observability::Telemetry;
