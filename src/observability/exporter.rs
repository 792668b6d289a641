//! Exporter selection.
//!
//! Wires each provider to the configured destination. The exporters
//! themselves come from `opentelemetry-stdout` and `opentelemetry-otlp`.

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{self as sdktrace, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};

use crate::config::{ExporterKind, TelemetryConfig};
use crate::observability::providers::{Signal, TelemetryError};

type Providers = (TracerProvider, SdkMeterProvider, LoggerProvider);

fn build_error(signal: Signal, reason: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Build {
        signal,
        reason: reason.to_string(),
    }
}

/// Build the tracer, meter and logger providers for `config.exporter`.
///
/// Batch processors and periodic readers run on the Tokio runtime, so this
/// must be called from within one.
pub(crate) fn build_providers(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<Providers, TelemetryError> {
    match config.exporter {
        ExporterKind::Stdout => Ok(stdout_providers(config, resource)),
        ExporterKind::Otlp => otlp_providers(config, resource),
        ExporterKind::None => Ok(unexported_providers(resource)),
    }
}

fn stdout_providers(config: &TelemetryConfig, resource: Resource) -> Providers {
    let tracer_provider = TracerProvider::builder()
        .with_config(sdktrace::Config::default().with_resource(resource.clone()))
        .with_batch_exporter(opentelemetry_stdout::SpanExporter::default(), runtime::Tokio)
        .build();

    let reader = PeriodicReader::builder(
        opentelemetry_stdout::MetricsExporter::default(),
        runtime::Tokio,
    )
    .with_interval(config.metric_interval())
    .build();
    let meter_provider = SdkMeterProvider::builder()
        .with_resource(resource.clone())
        .with_reader(reader)
        .build();

    let logger_provider = LoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(opentelemetry_stdout::LogExporter::default(), runtime::Tokio)
        .build();

    (tracer_provider, meter_provider, logger_provider)
}

fn otlp_providers(config: &TelemetryConfig, resource: Resource) -> Result<Providers, TelemetryError> {
    let endpoint = config.otlp_endpoint.as_str();

    let tracer_provider = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::Config::default().with_resource(resource.clone()))
        .install_batch(runtime::Tokio)
        .map_err(|e| build_error(Signal::Traces, e))?;

    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_resource(resource.clone())
        .with_period(config.metric_interval())
        .build()
        .map_err(|e| build_error(Signal::Metrics, e))?;

    let logger_provider = opentelemetry_otlp::new_pipeline()
        .logging()
        .with_resource(resource)
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .install_batch(runtime::Tokio)
        .map_err(|e| build_error(Signal::Logs, e))?;

    tracing::info!(endpoint, "OTLP exporters configured");
    Ok((tracer_provider, meter_provider, logger_provider))
}

// Signals are still recorded (spans get ids, counters aggregate) but nothing
// leaves the process.
fn unexported_providers(resource: Resource) -> Providers {
    let tracer_provider = TracerProvider::builder()
        .with_config(sdktrace::Config::default().with_resource(resource.clone()))
        .build();
    let meter_provider = SdkMeterProvider::builder()
        .with_resource(resource.clone())
        .build();
    let logger_provider = LoggerProvider::builder().with_resource(resource).build();

    (tracer_provider, meter_provider, logger_provider)
}
