//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that deserialize fine but
//! cannot run. Every problem is reported, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{ExporterKind, ServiceConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroConnections,

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("timeouts.write_secs ({write}) must not be shorter than timeouts.read_secs ({read})")]
    WriteShorterThanRead { read: u64, write: u64 },

    #[error("telemetry.service_name must not be empty")]
    EmptyServiceName,

    #[error("telemetry.otlp_endpoint is required when the otlp exporter is selected")]
    MissingOtlpEndpoint,

    #[error("telemetry.metric_interval_secs must be greater than zero")]
    ZeroMetricInterval,
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("read_secs", timeouts.read_secs),
        ("write_secs", timeouts.write_secs),
        ("shutdown_secs", timeouts.shutdown_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }
    if timeouts.write_secs < timeouts.read_secs {
        errors.push(ValidationError::WriteShorterThanRead {
            read: timeouts.read_secs,
            write: timeouts.write_secs,
        });
    }

    let telemetry = &config.telemetry;
    if telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }
    if telemetry.exporter == ExporterKind::Otlp && telemetry.otlp_endpoint.trim().is_empty() {
        errors.push(ValidationError::MissingOtlpEndpoint);
    }
    if telemetry.metric_interval_secs == 0 {
        errors.push(ValidationError::ZeroMetricInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.listener.max_connections = 0;
        config.timeouts.read_secs = 0;
        config.telemetry.service_name = "  ".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidBindAddress("not-an-address".into()),
                ValidationError::ZeroConnections,
                ValidationError::ZeroTimeout("read_secs"),
                ValidationError::EmptyServiceName,
            ]
        );
    }

    #[test]
    fn write_deadline_cannot_undercut_read() {
        let mut config = ServiceConfig::default();
        config.timeouts.read_secs = 20;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::WriteShorterThanRead { read: 20, write: 10 }]
        );
    }

    #[test]
    fn otlp_requires_endpoint() {
        let mut config = ServiceConfig::default();
        config.telemetry.exporter = ExporterKind::Otlp;
        config.telemetry.otlp_endpoint.clear();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingOtlpEndpoint]);
    }
}
