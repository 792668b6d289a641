//! Connection tracking for drain.
//!
//! Every accepted connection holds a [`ConnectionGuard`] until its task ends.
//! Shutdown waits on [`ConnectionTracker::wait_for_drain`], which wakes when
//! the last guard drops.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

// Uniqueness only; Relaxed is enough.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection number, used to correlate connection logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Open {
    count: AtomicU64,
    drained: Notify,
}

/// Counts open connections. Clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    open: Arc<Open>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection; it counts until the guard drops.
    pub fn track(&self) -> ConnectionGuard {
        self.open.count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            open: Arc::clone(&self.open),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.open.count.load(Ordering::SeqCst)
    }

    /// Resolve once no tracked connection remains open.
    ///
    /// Never times out on its own; bound it with `tokio::time::timeout`.
    pub async fn wait_for_drain(&self) {
        loop {
            let drained = self.open.drained.notified();
            tokio::pin!(drained);
            // Register before checking so a drop in between is not missed.
            drained.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            drained.await;
        }
    }
}

/// Held by a connection task for as long as the connection is open.
#[derive(Debug)]
pub struct ConnectionGuard {
    open: Arc<Open>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.open.count.fetch_sub(1, Ordering::SeqCst) - 1;
        tracing::trace!(connection_id = %self.id, remaining, "Connection closed");
        if remaining == 0 {
            self.open.drained.notify_waiters();
        }
    }
}
