//! Server lifecycle state machine.
//!
//! ```text
//! Created ──run──▶ Serving ──interrupt | accept fault──▶ Draining ──▶ Stopped
//! ```
//!
//! Shutdown order is fixed: stop accepting, drain in-flight connections,
//! then shut down telemetry. Telemetry emitted while draining is therefore
//! still exported.

use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::observability::Telemetry;

/// Where the server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener bound, not yet accepting.
    Created,
    /// Accept loop running.
    Serving,
    /// No longer accepting; waiting for in-flight requests.
    Draining,
    /// Connections drained and telemetry shut down.
    Stopped,
}

/// Owns the listener, the HTTP server and the telemetry bundle for one run.
pub struct Lifecycle {
    config: ServiceConfig,
    telemetry: Telemetry,
    server: HttpServer,
    listener: Listener,
    local_addr: SocketAddr,
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    /// Bind the listener for `app`.
    ///
    /// A bind failure is fatal: telemetry is shut down before the error is
    /// returned, since the lifecycle that would have done it never runs.
    pub async fn bind(config: ServiceConfig, telemetry: Telemetry, app: Router) -> Result<Self> {
        let listener = match bind_listener(&config).await {
            Ok(bound) => bound,
            Err(e) => {
                tracing::error!(error = %e, "Listener bind failed");
                if let Err(shutdown_err) = shutdown_telemetry(&telemetry).await {
                    tracing::error!(error = %shutdown_err, "Telemetry shutdown after bind failure");
                }
                return Err(e.into());
            }
        };

        let (local_addr, listener) = listener;
        let server = HttpServer::new(app, &config.timeouts);
        let (state, _) = watch::channel(LifecycleState::Created);

        Ok(Self {
            config,
            telemetry,
            server,
            listener,
            local_addr,
            state,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions, including those made inside [`Lifecycle::run`].
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve until `interrupt` resolves or the accept loop fails, then drain
    /// and shut down telemetry.
    ///
    /// Every step of the shutdown runs even if an earlier one failed; the
    /// first error is returned and all of them are logged.
    pub async fn run<F>(self, interrupt: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            telemetry,
            server,
            listener,
            local_addr,
            state,
        } = self;

        let tracker = server.tracker();
        let stop = Shutdown::new();
        let mut serve_task = tokio::spawn(server.serve(listener, stop.subscribe()));
        state.send_replace(LifecycleState::Serving);
        tracing::info!(address = %local_addr, "Serving");

        let fault = tokio::select! {
            joined = &mut serve_task => Some(joined),
            _ = interrupt => None,
        };
        state.send_replace(LifecycleState::Draining);

        let served = match fault {
            Some(joined) => {
                tracing::error!("Accept loop stopped without a shutdown request");
                flatten(joined)
            }
            None => {
                tracing::info!("Shutdown requested, draining connections");
                stop.trigger();
                flatten(serve_task.await)
            }
        };

        let deadline = config.timeouts.shutdown();
        let drained = match tokio::time::timeout(deadline, tracker.wait_for_drain()).await {
            Ok(()) => {
                tracing::info!("All connections drained");
                Ok(())
            }
            Err(_) => {
                let active = tracker.active_count();
                tracing::warn!(active, timeout = ?deadline, "Drain deadline passed, abandoning connections");
                Err(Error::DrainTimeout {
                    active,
                    timeout: deadline,
                })
            }
        };

        let telemetry_shutdown = shutdown_telemetry(&telemetry).await;
        if let Err(e) = &telemetry_shutdown {
            tracing::error!(error = %e, "Telemetry shutdown failed");
        }
        state.send_replace(LifecycleState::Stopped);
        tracing::info!("Stopped");

        served.and(drained).and(telemetry_shutdown)
    }
}

async fn bind_listener(config: &ServiceConfig) -> Result<(SocketAddr, Listener), ListenerError> {
    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
        address: config.listener.bind_address.clone(),
        source,
    })?;
    Ok((local_addr, listener))
}

fn flatten(joined: Result<Result<(), ListenerError>, JoinError>) -> Result<()> {
    let result = match joined {
        Ok(served) => served.map_err(Error::from),
        Err(e) => Err(Error::from(e)),
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, "Serving failed");
    }
    result
}

/// Shut telemetry down on a blocking thread; the SDK blocks while flushing.
async fn shutdown_telemetry(telemetry: &Telemetry) -> Result<()> {
    let telemetry = telemetry.clone();
    tokio::task::spawn_blocking(move || telemetry.shutdown()).await??;
    Ok(())
}
