//! In-memory telemetry bundle for tests.
//!
//! Compiled for this crate's unit tests and, behind the `testing` feature,
//! for integration tests.

use opentelemetry::logs::{AnyValue, Severity};
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::logs::LoggerProvider;
use opentelemetry_sdk::metrics::data::Sum;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::logs::InMemoryLogsExporter;
use opentelemetry_sdk::testing::metrics::InMemoryMetricsExporter;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use std::collections::BTreeMap;

use crate::observability::metrics::{ROLL_COUNTER, ROLL_VALUE};
use crate::observability::providers::Telemetry;

/// A log record reduced to the fields tests assert on.
#[derive(Debug, Clone)]
pub struct EmittedLog {
    pub body: Option<String>,
    pub severity: Option<Severity>,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
}

pub struct TestTelemetry {
    pub telemetry: Telemetry,
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricsExporter,
    pub logs: InMemoryLogsExporter,
}

impl Default for TestTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTelemetry {
    /// Full bundle. The periodic metric reader needs a Tokio runtime.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Traces and logs only, usable outside a runtime.
    pub fn new_without_metrics() -> Self {
        Self::build(false)
    }

    fn build(with_metrics: bool) -> Self {
        let spans = InMemorySpanExporter::default();
        let metrics = InMemoryMetricsExporter::default();
        let logs = InMemoryLogsExporter::default();

        let tracer_provider = TracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let mut meter_builder = SdkMeterProvider::builder();
        if with_metrics {
            meter_builder = meter_builder
                .with_reader(PeriodicReader::builder(metrics.clone(), runtime::Tokio).build());
        }
        let logger_provider = LoggerProvider::builder()
            .with_simple_exporter(logs.clone())
            .build();

        Self {
            telemetry: Telemetry::from_providers(
                tracer_provider,
                meter_builder.build(),
                logger_provider,
            ),
            spans,
            metrics,
            logs,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap()
    }

    pub fn emitted_logs(&self) -> Vec<EmittedLog> {
        self.logs
            .get_emitted_logs()
            .unwrap()
            .into_iter()
            .map(|log| EmittedLog {
                body: match &log.record.body {
                    Some(AnyValue::String(s)) => Some(s.to_string()),
                    _ => None,
                },
                severity: log.record.severity_number,
                trace_id: log.record.trace_context.as_ref().map(|tc| tc.trace_id),
                span_id: log.record.trace_context.as_ref().map(|tc| tc.span_id),
            })
            .collect()
    }

    /// Flush metrics and return `dice.rolls` totals keyed by roll value.
    pub async fn roll_counts(&self) -> BTreeMap<i64, u64> {
        let telemetry = self.telemetry.clone();
        tokio::task::spawn_blocking(move || telemetry.force_flush())
            .await
            .unwrap()
            .unwrap();
        roll_counts(&self.metrics)
    }
}

/// Latest cumulative `dice.rolls` totals held by `exporter`.
pub fn roll_counts(exporter: &InMemoryMetricsExporter) -> BTreeMap<i64, u64> {
    let mut counts = BTreeMap::new();
    let finished = exporter.get_finished_metrics().unwrap();
    let Some(latest) = finished.last() else {
        return counts;
    };

    for scope in &latest.scope_metrics {
        for metric in scope.metrics.iter().filter(|m| m.name == ROLL_COUNTER) {
            let sum = metric
                .data
                .as_any()
                .downcast_ref::<Sum<u64>>()
                .expect("dice.rolls is a u64 sum");
            for point in &sum.data_points {
                let roll = point
                    .attributes
                    .iter()
                    .find(|kv| kv.key.as_str() == ROLL_VALUE)
                    .and_then(|kv| match kv.value {
                        Value::I64(v) => Some(v),
                        _ => None,
                    })
                    .expect("every data point carries roll.value");
                *counts.entry(roll).or_default() += point.value;
            }
        }
    }
    counts
}
