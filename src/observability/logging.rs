//! Structured local logging.
//!
//! # Design Decisions
//! - Uses the tracing crate for local diagnostics
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured filter
//!
//! The correlated dice log records go through the OpenTelemetry logger
//! instead (see `metrics.rs`); this subscriber only serves operators.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Install the global tracing subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| LoggingError::Filter {
            filter: config.filter.clone(),
            reason: e.to_string(),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };
    installed.map_err(|e| LoggingError::Install(e.to_string()))
}

/// Initialize logging for tests (only logs errors).
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_reported() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            filter: "dice_server=loud[".to_string(),
            format: LogFormat::Pretty,
        };
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::Filter { .. })
        ));
    }
}
