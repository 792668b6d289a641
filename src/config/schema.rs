//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the dice service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Per-connection and shutdown timeouts.
    pub timeouts: TimeoutConfig,

    /// Telemetry pipeline settings.
    pub telemetry: TelemetryConfig,

    /// Local diagnostic logging.
    pub logging: LoggingConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration, all values in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading request headers on a connection.
    pub read_secs: u64,

    /// Deadline for producing a response once the request has been read.
    pub write_secs: u64,

    /// Upper bound on draining in-flight connections during shutdown.
    pub shutdown_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 1,
            write_secs: 10,
            shutdown_secs: 30,
        }
    }
}

/// Where finished spans, metric readings and log records are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// Pretty-printed to standard output.
    Stdout,
    /// OTLP over gRPC to a collector.
    Otlp,
    /// Recorded by the SDK but never exported.
    None,
}

/// Telemetry pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,

    /// Exporter used by all three providers.
    pub exporter: ExporterKind,

    /// Collector endpoint, used when `exporter = "otlp"`.
    pub otlp_endpoint: String,

    /// Interval between periodic metric exports.
    pub metric_interval_secs: u64,
}

impl TelemetryConfig {
    pub fn metric_interval(&self) -> Duration {
        Duration::from_secs(self.metric_interval_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "dice".to_string(),
            exporter: ExporterKind::Stdout,
            otlp_endpoint: "http://localhost:4317".to_string(),
            metric_interval_secs: 60,
        }
    }
}

/// Output format for local logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Local logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    pub filter: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dice_server=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.read(), Duration::from_secs(1));
        assert_eq!(config.timeouts.write(), Duration::from_secs(10));
        assert_eq!(config.telemetry.exporter, ExporterKind::Stdout);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [telemetry]
            exporter = "otlp"
            otlp_endpoint = "http://collector:4317"

            [timeouts]
            shutdown_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.telemetry.exporter, ExporterKind::Otlp);
        assert_eq!(config.telemetry.otlp_endpoint, "http://collector:4317");
        assert_eq!(config.telemetry.service_name, "dice");
        assert_eq!(config.timeouts.shutdown_secs, 5);
        assert_eq!(config.timeouts.read_secs, 1);
    }
}
