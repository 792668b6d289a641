//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (tracing spans, request ID, timeouts, panic isolation)
//! - Run the accept loop over a bounded listener
//! - Serve each connection on its own task with HTTP/1.1 and HTTP/2
//! - Drain connections gracefully when asked to stop

use axum::{middleware, routing::any, Router};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::TimeoutConfig;
use crate::http::handlers;
use crate::http::middleware::{route_span, server_span, HttpTracing, SERVER_OPERATION};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::observability::{DiceInstruments, Telemetry};

/// HTTP/2 ping interval, and how long to wait for the ack before closing.
const H2_KEEP_ALIVE: Duration = Duration::from_secs(20);

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dice: Arc<DiceInstruments>,
}

impl AppState {
    pub fn new(telemetry: &Telemetry) -> Self {
        Self {
            dice: Arc::new(DiceInstruments::new(telemetry)),
        }
    }
}

/// The service's routes, before instrumentation.
///
/// Callers may merge extra routes before passing the result to [`build_app`].
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", any(handlers::hello))
        .route("/dice", any(handlers::dice))
        .route("/dice/{player}", any(handlers::dice_for_player))
}

/// Instrument `routes` and apply the middleware stack.
///
/// Outermost first: request id, access log, server span, panic isolation,
/// response deadline, then per-route spans around each handler.
#[allow(deprecated)]
pub fn build_app(routes: Router<AppState>, telemetry: &Telemetry, timeouts: &TimeoutConfig) -> Router {
    let http_tracing = HttpTracing::new(telemetry, SERVER_OPERATION);

    routes
        .route_layer(middleware::from_fn_with_state(http_tracing.clone(), route_span))
        .with_state(AppState::new(telemetry))
        .layer(TimeoutLayer::new(timeouts.write()))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(http_tracing, server_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// HTTP server over a bounded listener.
pub struct HttpServer {
    app: Router,
    read_timeout: Duration,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server for the instrumented `app`.
    pub fn new(app: Router, timeouts: &TimeoutConfig) -> Self {
        Self {
            app,
            read_timeout: timeouts.read(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Tracker for the connections this server opens, used to await drain.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept connections until `stop` fires or the listener faults.
    ///
    /// On return every open connection has been asked to finish its
    /// in-flight request and close; use [`HttpServer::tracker`] to wait for them.
    pub async fn serve(
        self,
        listener: Listener,
        mut stop: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let (drain_tx, drain_rx) = watch::channel(());

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP server accepting connections");
        }

        let result = loop {
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("Stop accepting connections");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let connection = Connection {
                            app: self.app.clone(),
                            read_timeout: self.read_timeout,
                            guard: self.tracker.track(),
                            _permit: permit,
                            drain: drain_rx.clone(),
                        };
                        tokio::spawn(connection.serve(stream, peer));
                    }
                    Err(e) => match e.retry_after() {
                        Some(delay) if delay.is_zero() => {
                            tracing::debug!(error = %e, "Peer aborted before accept");
                        }
                        Some(delay) => {
                            tracing::warn!(error = %e, backoff = ?delay, "Accept failed, backing off");
                            tokio::select! {
                                _ = stop.recv() => {
                                    tracing::info!("Stop accepting connections");
                                    break Ok(());
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            tracing::error!(error = %e, "Accept loop failed");
                            break Err(e);
                        }
                    },
                },
            }
        };

        // Listener drops here; open connections finish their current request.
        drop(listener);
        drain_tx.send_replace(());
        result
    }
}

/// One accepted connection and everything it holds until it closes.
struct Connection {
    app: Router,
    read_timeout: Duration,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    drain: watch::Receiver<()>,
}

impl Connection {
    async fn serve(mut self, stream: TcpStream, peer: SocketAddr) {
        let connection_id = self.guard.id();
        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.read_timeout);
        // h2 has no header read deadline; keep-alive pings reap dead peers.
        builder
            .http2()
            .timer(TokioTimer::new())
            .keep_alive_interval(Some(H2_KEEP_ALIVE))
            .keep_alive_timeout(H2_KEEP_ALIVE);

        let service = TowerToHyperService::new(self.app.clone());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    // Write failures land here after the handler has already
                    // committed its telemetry; nothing to roll back.
                    if let Err(e) = result {
                        tracing::debug!(
                            connection_id = %connection_id,
                            peer_addr = %peer,
                            error = %e,
                            "Connection ended with error"
                        );
                    }
                    break;
                }
                changed = self.drain.changed(), if !draining => {
                    draining = true;
                    if changed.is_ok() {
                        tracing::trace!(connection_id = %connection_id, "Draining connection");
                    }
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }
}
