//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use axum::Router;
use dice_server::config::{ExporterKind, ServiceConfig};
use dice_server::lifecycle::{Lifecycle, LifecycleState, Shutdown};
use dice_server::observability::{init_test_logging, Telemetry};
use opentelemetry::Value;
use opentelemetry_sdk::export::trace::SpanData;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use dice_server::observability::testing::{roll_counts, TestTelemetry};

/// Config for a server on an ephemeral loopback port, exporting nowhere.
pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.telemetry.exporter = ExporterKind::None;
    config.timeouts.shutdown_secs = 5;
    config
}

pub fn find_span<'a>(spans: &'a [SpanData], name: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no span named {name:?} in {:?}", names(spans)))
}

pub fn names(spans: &[SpanData]) -> Vec<String> {
    spans.iter().map(|s| s.name.to_string()).collect()
}

pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

/// A running [`Lifecycle`] driven from a test.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: watch::Receiver<LifecycleState>,
    stop: Shutdown,
    handle: JoinHandle<dice_server::Result<()>>,
}

impl TestServer {
    pub async fn start(config: ServiceConfig, telemetry: Telemetry, app: Router) -> Self {
        init_test_logging();
        let lifecycle = Lifecycle::bind(config, telemetry, app).await.unwrap();
        let addr = lifecycle.local_addr();
        let mut state = lifecycle.subscribe_state();
        let stop = Shutdown::new();
        let handle = tokio::spawn(lifecycle.run(stop.signalled()));

        state
            .wait_for(|s| *s == LifecycleState::Serving)
            .await
            .unwrap();

        Self {
            addr,
            state,
            stop,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request shutdown without waiting for it.
    pub fn interrupt(&self) {
        self.stop.trigger();
    }

    /// Request shutdown and wait for the lifecycle to finish.
    pub async fn shutdown(self) -> dice_server::Result<()> {
        self.stop.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("lifecycle finishes")
            .unwrap()
    }
}
