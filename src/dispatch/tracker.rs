//! Tracks every task the dispatcher spawned, for drain and force-close.
//!
//! Queued, running and rejecting connections all hold a [`ConnectionGuard`].
//! Draining waits for the count to reach zero; force-closing flips a watch
//! flag that every tracked task selects on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify};

use crate::net::ConnectionId;

#[derive(Debug)]
struct TrackerState {
    active_count: AtomicUsize,
    idle: Notify,
    force_close: watch::Sender<bool>,
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    state: Arc<TrackerState>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        let (force_close, _) = watch::channel(false);
        Self {
            state: Arc::new(TrackerState {
                active_count: AtomicUsize::new(0),
                idle: Notify::new(),
                force_close,
            }),
        }
    }

    /// Record a new tracked connection. Returns a guard that decrements on drop.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        self.state.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            state: Arc::clone(&self.state),
            id,
        }
    }

    /// Get current tracked connection count.
    pub fn active_count(&self) -> usize {
        self.state.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Tell every tracked task to abandon its connection.
    pub fn force_close(&self) {
        self.state.force_close.send_replace(true);
    }

    /// Resolves once [`force_close`](Self::force_close) has been called.
    pub async fn force_closed(&self) {
        let mut rx = self.state.force_close.subscribe();
        let _ = rx.wait_for(|forced| *forced).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's task lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    state: Arc<TrackerState>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.state.active_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection released");
    }
}
