//! Top-level error type.
//!
//! Startup failures (config, logging, telemetry, bind) abort before traffic
//! is served. Serving faults and shutdown failures are surfaced when the
//! lifecycle finishes. Per-request failures never reach this type.

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::net::ListenerError;
use crate::observability::{LoggingError, TelemetryError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{active} connection(s) still open after the {timeout:?} drain deadline")]
    DrainTimeout { active: u64, timeout: Duration },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
