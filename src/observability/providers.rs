//! Telemetry provider bundle.
//!
//! Owns the tracer, meter and logger providers for the process and tears
//! them down together. Components receive a [`Telemetry`] handle explicitly;
//! nothing in this crate reads the OpenTelemetry globals.

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::logs::{Logger, LoggerProvider};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use opentelemetry_sdk::Resource;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::TelemetryConfig;
use crate::observability::exporter;

/// One of the three telemetry signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        })
    }
}

/// Per-signal failures collected while flushing or shutting down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalFailures {
    failures: Vec<(Signal, String)>,
}

impl SignalFailures {
    fn record(&mut self, signal: Signal, error: impl fmt::Display) {
        self.failures.push((signal, error.to_string()));
    }

    /// Signals that failed, in the order they were attempted.
    pub fn signals(&self) -> impl Iterator<Item = Signal> + '_ {
        self.failures.iter().map(|(signal, _)| *signal)
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SignalFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (signal, message)) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{signal}: {message}")?;
        }
        Ok(())
    }
}

/// Errors raised by the telemetry bundle.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A provider could not be constructed.
    #[error("failed to build {signal} provider: {reason}")]
    Build { signal: Signal, reason: String },

    /// One or more providers failed to flush.
    #[error("telemetry flush failed: {0}")]
    Flush(SignalFailures),

    /// One or more providers failed to shut down.
    #[error("telemetry shutdown failed: {0}")]
    Shutdown(SignalFailures),
}

/// Resource descriptor attached to every span, metric and log record.
pub fn service_resource(service_name: &str) -> Resource {
    Resource::default().merge(&Resource::new([
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]))
}

#[derive(Debug)]
struct Inner {
    tracer_provider: TracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: LoggerProvider,
    propagator: TraceContextPropagator,
    shut_down: AtomicBool,
}

/// Handle to the process telemetry pipeline.
///
/// Cheap to clone; all clones share the same providers and shutdown state.
#[derive(Debug, Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl Telemetry {
    /// Build all three providers from configuration.
    ///
    /// Fails fast if any provider cannot be constructed; providers built
    /// before the failure are dropped.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let resource = service_resource(&config.service_name);
        let (tracer_provider, meter_provider, logger_provider) =
            exporter::build_providers(config, resource)?;

        tracing::info!(
            service = %config.service_name,
            exporter = ?config.exporter,
            "Telemetry providers initialized"
        );

        Ok(Self::from_providers(
            tracer_provider,
            meter_provider,
            logger_provider,
        ))
    }

    /// Assemble a bundle from already-built providers.
    pub fn from_providers(
        tracer_provider: TracerProvider,
        meter_provider: SdkMeterProvider,
        logger_provider: LoggerProvider,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tracer_provider,
                meter_provider,
                logger_provider,
                propagator: TraceContextPropagator::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register this bundle as the process-wide default.
    ///
    /// Installs the W3C trace-context propagator and the global tracer and
    /// meter providers, for third-party code that only knows the globals.
    pub fn install_global(&self) {
        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(self.inner.tracer_provider.clone());
        global::set_meter_provider(self.inner.meter_provider.clone());
    }

    pub fn tracer(&self, name: &'static str) -> Tracer {
        self.inner.tracer_provider.tracer(name)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.inner.meter_provider.meter(name)
    }

    pub fn logger(&self, name: &'static str) -> Logger {
        self.inner.logger_provider.logger(name)
    }

    /// Propagator used to read trace context from inbound requests.
    pub fn propagator(&self) -> &TraceContextPropagator {
        &self.inner.propagator
    }

    /// Export everything buffered so far without shutting down.
    ///
    /// Blocks the calling thread; call from `spawn_blocking` inside a runtime.
    pub fn force_flush(&self) -> Result<(), TelemetryError> {
        let mut failures = SignalFailures::default();

        for result in self.inner.tracer_provider.force_flush() {
            if let Err(e) = result {
                failures.record(Signal::Traces, e);
            }
        }
        if let Err(e) = self.inner.meter_provider.force_flush() {
            failures.record(Signal::Metrics, e);
        }
        for result in self.inner.logger_provider.force_flush() {
            if let Err(e) = result {
                failures.record(Signal::Logs, e);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TelemetryError::Flush(failures))
        }
    }

    /// Flush and shut down all three providers.
    ///
    /// Every provider is attempted even if an earlier one fails. Only the
    /// first call does any work; later calls return `Ok(())`.
    ///
    /// Blocks the calling thread; call from `spawn_blocking` inside a runtime.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("Telemetry already shut down");
            return Ok(());
        }

        let mut failures = SignalFailures::default();
        if let Err(e) = self.inner.tracer_provider.shutdown() {
            failures.record(Signal::Traces, e);
        }
        if let Err(e) = self.inner.meter_provider.shutdown() {
            failures.record(Signal::Metrics, e);
        }
        if let Err(e) = self.inner.logger_provider.shutdown() {
            failures.record(Signal::Logs, e);
        }

        if failures.is_empty() {
            tracing::info!("Telemetry shut down");
            Ok(())
        } else {
            tracing::error!(error = %failures, "Telemetry shutdown incomplete");
            Err(TelemetryError::Shutdown(failures))
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::testing::TestTelemetry;

    #[test]
    fn failures_render_in_attempt_order() {
        let mut failures = SignalFailures::default();
        failures.record(Signal::Traces, "exporter closed");
        failures.record(Signal::Logs, "timed out");

        assert_eq!(failures.to_string(), "traces: exporter closed; logs: timed out");
        assert_eq!(
            failures.signals().collect::<Vec<_>>(),
            vec![Signal::Traces, Signal::Logs]
        );
    }

    #[test]
    fn resource_carries_service_name() {
        let resource = service_resource("dice-test");
        let name = resource.get(opentelemetry::Key::from_static_str("service.name"));
        assert_eq!(name.map(|v| v.to_string()), Some("dice-test".to_string()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_is_idempotent() {
        let harness = TestTelemetry::new();
        let telemetry = harness.telemetry.clone();

        let results = tokio::task::spawn_blocking(move || {
            let first = telemetry.shutdown();
            let second = telemetry.shutdown();
            (first, second, telemetry.is_shutdown())
        })
        .await
        .unwrap();

        assert!(results.0.is_ok());
        assert!(results.1.is_ok());
        assert!(results.2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_provider_does_not_stop_the_others() {
        let harness = TestTelemetry::new();
        let telemetry = harness.telemetry.clone();

        let result = tokio::task::spawn_blocking(move || {
            // A provider shut down behind the bundle's back fails the second time.
            telemetry.inner.tracer_provider.shutdown().unwrap();
            telemetry.shutdown()
        })
        .await
        .unwrap();

        let failures = match result {
            Err(TelemetryError::Shutdown(failures)) => failures,
            other => panic!("expected a shutdown failure, got {other:?}"),
        };
        assert_eq!(failures.signals().collect::<Vec<_>>(), vec![Signal::Traces]);
        assert!(failures.to_string().starts_with("traces: "));

        // Metrics and logs were still shut down: doing it again now fails.
        let inner = &harness.telemetry.inner;
        assert!(inner.meter_provider.shutdown().is_err());
        assert!(inner.logger_provider.shutdown().is_err());
        assert!(harness.telemetry.is_shutdown());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn clones_share_shutdown_state() {
        let harness = TestTelemetry::new();
        let clone = harness.telemetry.clone();

        tokio::task::spawn_blocking(move || clone.shutdown())
            .await
            .unwrap()
            .unwrap();

        assert!(harness.telemetry.is_shutdown());
    }
}
