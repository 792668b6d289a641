//! Dice instruments.
//!
//! # Metrics
//! - `dice.rolls` (counter, `{roll}`): rolls by `roll.value`
//!
//! The tracer, counter and OTel logger used by the dice handler are created
//! once here and shared by every request. All of them are safe for
//! concurrent use, so handlers need no locking.

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, Severity};
use opentelemetry::metrics::Counter;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::logs::Logger;
use opentelemetry_sdk::trace::Tracer;
use std::time::SystemTime;

use crate::observability::providers::Telemetry;

/// Instrumentation scope for everything the service emits.
pub const INSTRUMENTATION_NAME: &str = "dice-server";

/// Counter of dice rolls.
pub const ROLL_COUNTER: &str = "dice.rolls";

/// Span attribute and counter dimension carrying the rolled value.
pub const ROLL_VALUE: &str = "roll.value";

#[derive(Debug)]
pub struct DiceInstruments {
    tracer: Tracer,
    rolls: Counter<u64>,
    logger: Logger,
}

impl DiceInstruments {
    pub fn new(telemetry: &Telemetry) -> Self {
        let rolls = telemetry
            .meter(INSTRUMENTATION_NAME)
            .u64_counter(ROLL_COUNTER)
            .with_description("The number of rolls by roll value")
            .with_unit("{roll}")
            .init();

        Self {
            tracer: telemetry.tracer(INSTRUMENTATION_NAME),
            rolls,
            logger: telemetry.logger(INSTRUMENTATION_NAME),
        }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Tag the active span in `cx` with the roll and count it.
    pub fn record_roll(&self, cx: &Context, roll: u8) {
        let value = KeyValue::new(ROLL_VALUE, i64::from(roll));
        cx.span().set_attribute(value.clone());
        self.rolls.add(1, &[value]);
    }

    /// Emit an info log record correlated with the active span in `cx`.
    pub fn log_roll(&self, cx: &Context, message: &str, roll: u8) {
        let mut record = self.logger.create_log_record();
        record.set_timestamp(SystemTime::now());
        record.set_severity_number(Severity::Info);
        record.set_body(AnyValue::from(message.to_string()));
        record.add_attribute("result", i64::from(roll));

        // The SDK stamps trace and span ids from the current context.
        let _attached = cx.clone().attach();
        self.logger.emit(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::testing::TestTelemetry;
    use crate::observability::tracing::SpanGuard;
    use opentelemetry::trace::Tracer as _;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn record_roll_tags_span_and_counts() {
        let harness = TestTelemetry::new();
        let dice = DiceInstruments::new(&harness.telemetry);

        {
            let guard = SpanGuard::new(Context::new().with_span(dice.tracer().start("roll")));
            dice.record_roll(guard.context(), 4);
        }
        let guard = SpanGuard::new(Context::new().with_span(dice.tracer().start("roll")));
        dice.record_roll(guard.context(), 4);
        drop(guard);

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 2);
        assert!(spans
            .iter()
            .all(|s| s.attributes.contains(&KeyValue::new(ROLL_VALUE, 4i64))));

        let counts = harness.roll_counts().await;
        assert_eq!(counts.get(&4), Some(&2));
        assert_eq!(counts.values().sum::<u64>(), 2);
    }

    #[test]
    fn log_roll_carries_span_identity() {
        let harness = TestTelemetry::new_without_metrics();
        let dice = DiceInstruments::new(&harness.telemetry);

        let guard = SpanGuard::new(Context::new().with_span(dice.tracer().start("roll")));
        dice.log_roll(guard.context(), "Alice is rolling the dice", 3);
        let expected = guard.span_context();
        drop(guard);

        let logs = harness.emitted_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].body.as_deref(), Some("Alice is rolling the dice"));
        assert_eq!(logs[0].severity, Some(Severity::Info));
        assert_eq!(logs[0].trace_id, Some(expected.trace_id()));
        assert_eq!(logs[0].span_id, Some(expected.span_id()));
    }

    #[test]
    fn log_without_span_is_uncorrelated() {
        let harness = TestTelemetry::new_without_metrics();
        let dice = DiceInstruments::new(&harness.telemetry);

        dice.log_roll(&Context::new(), "Anonymous player is rolling the dice", 1);

        let logs = harness.emitted_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].trace_id, None);
    }
}
