//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     TelemetryConfig → providers.rs (tracer, meter, logger providers)
//!                     → exporter.rs (stdout | otlp | none)
//!
//! Per request:
//!     http middleware → tracing.rs (extract context, span guards)
//!     dice handler    → metrics.rs (roll span attribute, dice.rolls, log record)
//!
//! Shutdown:
//!     Telemetry::shutdown → flush + close all three providers, once
//! ```
//!
//! # Design Decisions
//! - One explicit `Telemetry` handle instead of global provider lookups
//! - Every exported signal from a request shares that request's trace id
//! - Local operator logs (logging.rs) are separate from exported log records

pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod providers;
pub mod tracing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use logging::{init_logging, init_test_logging, LoggingError};
pub use metrics::{DiceInstruments, INSTRUMENTATION_NAME, ROLL_COUNTER, ROLL_VALUE};
pub use providers::{service_resource, Signal, SignalFailures, Telemetry, TelemetryError};
pub use self::tracing::{HeaderExtractor, SpanGuard};
