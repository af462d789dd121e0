//! Shutdown coordination for the server.

use std::sync::Arc;
use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Cloning yields another handle to the same signal. The first
/// [`trigger`](Self::trigger) starts draining; a second one asks for
/// in-flight work to be force-closed without waiting for the drain deadline.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Number of shutdown requests received so far.
    tx: Arc<watch::Sender<u32>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown. Returns how many requests have now been made.
    pub fn trigger(&self) -> u32 {
        let mut count = 0;
        self.tx.send_modify(|requests| {
            *requests = requests.saturating_add(1);
            count = *requests;
        });
        count
    }

    /// Number of shutdown requests so far.
    pub fn requests(&self) -> u32 {
        *self.tx.borrow()
    }

    pub fn is_triggered(&self) -> bool {
        self.requests() > 0
    }

    /// Resolves on the first shutdown request.
    pub async fn triggered(&self) {
        self.wait_for_requests(1).await;
    }

    /// Resolves on the second shutdown request.
    pub async fn forced(&self) {
        self.wait_for_requests(2).await;
    }

    async fn wait_for_requests(&self, n: u32) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|requests| *requests >= n).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
