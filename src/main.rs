//! dice-server
//!
//! An HTTP dice roller instrumented with OpenTelemetry traces, metrics and logs.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌────────────────────────────────────────────────────┐
//!                  │                    DICE SERVER                     │
//!                  │                                                    │
//!  Client Request  │  ┌─────────┐   ┌──────────────┐   ┌────────────┐  │
//!  ────────────────┼─▶│   net   │──▶│ http server  │──▶│  handlers  │  │
//!                  │  │listener │   │ server span  │   │ roll span  │  │
//!                  │  └─────────┘   │ route span   │   │ counter,log│  │
//!                  │                └──────────────┘   └─────┬──────┘  │
//!                  │                                         │         │
//!                  │                                         ▼         │
//!                  │                              ┌──────────────────┐ │
//!                  │                              │    Telemetry     │─┼──▶ stdout / OTLP
//!                  │                              │ traces/metrics/  │ │
//!                  │                              │      logs        │ │
//!                  │                              └──────────────────┘ │
//!                  │                                                    │
//!                  │  config ─▶ lifecycle: Serving → Draining → Stopped │
//!                  └────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use dice_server::config::{
    load_config, validate_config, ConfigError, ExporterKind, LogFormat, ServiceConfig,
};
use dice_server::lifecycle::{wait_for_signal, Lifecycle};
use dice_server::observability::{init_logging, Telemetry};
use dice_server::{build_app, routes, Error};

#[derive(Parser)]
#[command(name = "dice-server")]
#[command(about = "Roll dice over HTTP, with OpenTelemetry instrumentation", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long, env = "DICE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long, env = "DICE_BIND")]
    bind: Option<String>,

    #[arg(long, value_enum, env = "DICE_EXPORTER")]
    exporter: Option<ExporterKind>,

    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[arg(long, value_enum, env = "DICE_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn into_config(self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServiceConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.listener.bind_address = bind;
        }
        if let Some(exporter) = self.exporter {
            config.telemetry.exporter = exporter;
        }
        if let Some(endpoint) = self.otlp_endpoint {
            config.telemetry.otlp_endpoint = endpoint;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            // Logging is configured from this config, so report directly.
            eprintln!("dice-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("dice-server: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "dice-server exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), Error> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        exporter = ?config.telemetry.exporter,
        service_name = %config.telemetry.service_name,
        "dice-server starting"
    );

    let telemetry = Telemetry::from_config(&config.telemetry)?;
    telemetry.install_global();

    let app = build_app(routes(), &telemetry, &config.timeouts);
    let lifecycle = Lifecycle::bind(config, telemetry, app).await?;
    tracing::info!(address = %lifecycle.local_addr(), "Listening for connections");

    lifecycle.run(wait_for_signal()).await
}
