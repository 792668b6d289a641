//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Separate transient accept errors from listener faults

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Pause after an accept error that is not tied to one peer, such as running
/// out of file descriptors. Gives open connections time to close.
pub const RESOURCE_BACKOFF: Duration = Duration::from_secs(1);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] io::Error),

    /// The connection limit semaphore was closed.
    #[error("Connection limiter closed")]
    Closed,
}

impl ListenerError {
    /// How long the accept loop should wait before accepting again, or
    /// `None` if the listener itself is unusable.
    ///
    /// Aborted or reset handshakes only affect the one peer and are retried
    /// at once. Every other accept error (EMFILE, ENFILE, ENOBUFS, ENOMEM and
    /// friends) is retried after [`RESOURCE_BACKOFF`]; only a listener that is
    /// no longer listening, or a closed limiter, ends the loop.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ListenerError::Accept(e) => match e.kind() {
                io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock => Some(Duration::ZERO),
                io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected => None,
                _ => Some(RESOURCE_BACKOFF),
            },
            ListenerError::Bind { .. } | ListenerError::Closed => None,
        }
    }

    /// Whether the accept loop can keep going after this error.
    pub fn is_transient(&self) -> bool {
        self.retry_after().is_some()
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
    /// Configured maximum connections.
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let bind_error = |source| ListenerError::Bind {
            address: config.bind_address.clone(),
            source,
        };

        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Stop handing out connection slots; the next `accept` fails with
    /// [`ListenerError::Closed`].
    #[cfg(test)]
    pub(crate) fn close(&self) {
        self.connection_limit.close();
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool,
/// including when the connection task unwinds.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections,
        }
    }

    #[tokio::test]
    async fn permits_follow_connection_lifetime() {
        let listener = Listener::bind(&local(2)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert_eq!(listener.max_connections(), 2);

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported_with_address() {
        let first = Listener::bind(&local(1)).await.unwrap();
        let taken = first.local_addr().unwrap().to_string();

        let err = Listener::bind(&ListenerConfig {
            bind_address: taken.clone(),
            max_connections: 1,
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ListenerError::Bind { ref address, .. } if *address == taken));
        assert!(!err.is_transient());
    }

    #[test]
    fn peer_errors_retry_immediately() {
        let aborted = ListenerError::Accept(io::Error::from(io::ErrorKind::ConnectionAborted));
        let reset = ListenerError::Accept(io::Error::from(io::ErrorKind::ConnectionReset));

        assert_eq!(aborted.retry_after(), Some(Duration::ZERO));
        assert_eq!(reset.retry_after(), Some(Duration::ZERO));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn resource_exhaustion_backs_off_instead_of_stopping() {
        // EMFILE, ENFILE, ENOBUFS, ENOMEM
        for errno in [24, 23, 105, 12] {
            let err = ListenerError::Accept(io::Error::from_raw_os_error(errno));
            assert_eq!(err.retry_after(), Some(RESOURCE_BACKOFF), "errno {errno}");
            assert!(err.is_transient());
        }
    }

    #[test]
    fn unknown_accept_errors_back_off() {
        let denied = ListenerError::Accept(io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(denied.retry_after(), Some(RESOURCE_BACKOFF));
    }

    #[test]
    fn broken_listener_is_fatal() {
        let not_listening = ListenerError::Accept(io::Error::from(io::ErrorKind::InvalidInput));

        assert_eq!(not_listening.retry_after(), None);
        assert!(!ListenerError::Closed.is_transient());
    }

    #[tokio::test]
    async fn closed_limiter_fails_accept() {
        let listener = Listener::bind(&local(1)).await.unwrap();
        listener.close();

        assert!(matches!(listener.accept().await, Err(ListenerError::Closed)));
    }
}
