//! Bounded worker pool.
//!
//! # Responsibilities
//! - Admit at most `max_concurrent` connections at once (one [`Slot`] each)
//! - Queue up to `queue_depth` more, served strictly in arrival order
//! - Reject the rest immediately with a capacity response or a reset
//! - Drain on shutdown: reject queued work, wait for in-flight, force-close stragglers
//!
//! # Design Decisions
//! - Slots are permits of a fair tokio semaphore; the queue is a bounded channel
//!   consumed by a single task, so waiters are granted slots in FIFO order
//! - New arrivals never overtake queued connections
//! - Every spawned task is tracked, so drain knows when the pool is empty

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Semaphore, TryAcquireError};
use tokio::time::Instant;

use crate::config::{PoolConfig, RejectMode, TimeoutConfig};
use crate::dispatch::slot::{Slot, SlotStats};
use crate::dispatch::tracker::{ConnectionGuard, ConnectionTracker};
use crate::dispatch::worker::{self, Rejection};
use crate::http::Handler;
use crate::net::Connection;

/// Why [`WorkerPool::submit`] turned a connection away.
///
/// The connection has already been answered or reset when this is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("pool saturated")]
    Saturated,
    #[error("pool draining")]
    Draining,
}

/// Timeouts applied to every served connection.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connection_timeout: Duration,
}

impl From<&TimeoutConfig> for WorkerSettings {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            read_timeout: config.read(),
            write_timeout: config.write(),
            connection_timeout: config.connection(),
        }
    }
}

/// What happened while draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Connections that were in flight when draining began and finished on their own.
    pub drained: usize,
    /// Connections still running at the deadline.
    pub force_closed: usize,
    /// Queued connections answered with a draining rejection.
    pub queued_rejected: usize,
    pub duration: Duration,
}

struct Queued {
    conn: Connection,
    guard: ConnectionGuard,
}

pub(crate) struct PoolShared<H> {
    pub(crate) handler: H,
    pub(crate) settings: WorkerSettings,
    pub(crate) reject_mode: RejectMode,
    pub(crate) tracker: ConnectionTracker,
    permits: Arc<Semaphore>,
    stats: Arc<SlotStats>,
    max_concurrent: usize,
    queue_depth: usize,
    queue: Option<mpsc::Sender<Queued>>,
    queued: AtomicUsize,
    queued_rejected: AtomicUsize,
    draining: watch::Sender<bool>,
}

impl<H> PoolShared<H> {
    fn is_draining(&self) -> bool {
        *self.draining.borrow()
    }

    fn slot(&self, permit: tokio::sync::OwnedSemaphorePermit) -> Slot {
        Slot::new(permit, Arc::clone(&self.stats))
    }
}

/// Read-only view of pool occupancy, cheap to clone and hand to observers.
#[derive(Debug, Clone)]
pub struct PoolMonitor {
    permits: Arc<Semaphore>,
    stats: Arc<SlotStats>,
    max_concurrent: usize,
}

impl PoolMonitor {
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.stats.peak()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

/// Dispatches connections onto a bounded set of worker tasks.
pub struct WorkerPool<H> {
    shared: Arc<PoolShared<H>>,
}

impl<H> Clone for WorkerPool<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: Handler> WorkerPool<H> {
    /// Create the pool. Must be called from within a Tokio runtime.
    pub fn new(config: &PoolConfig, timeouts: &TimeoutConfig, handler: H) -> Self {
        let (queue, queue_rx) = if config.queue_depth > 0 {
            let (tx, rx) = mpsc::channel(config.queue_depth);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let (draining, _) = watch::channel(false);

        let shared = Arc::new(PoolShared {
            handler,
            settings: WorkerSettings::from(timeouts),
            reject_mode: config.reject_mode,
            tracker: ConnectionTracker::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            stats: Arc::new(SlotStats::default()),
            max_concurrent: config.max_concurrent,
            queue_depth: config.queue_depth,
            queue,
            queued: AtomicUsize::new(0),
            queued_rejected: AtomicUsize::new(0),
            draining,
        });

        if let Some(rx) = queue_rx {
            tokio::spawn(run_queue(Arc::clone(&shared), rx));
        }

        tracing::debug!(
            max_concurrent = config.max_concurrent,
            queue_depth = config.queue_depth,
            reject_mode = ?config.reject_mode,
            "Worker pool ready"
        );
        Self { shared }
    }

    /// Hand a connection to the pool.
    ///
    /// Returns once the connection is running, queued, or rejected; it never
    /// waits for a slot.
    pub fn submit(&self, conn: Connection) -> Result<(), SubmitError> {
        let shared = &self.shared;
        let guard = shared.tracker.track(conn.id());

        if shared.is_draining() {
            worker::dispatch_rejection(shared, conn, Rejection::Draining, guard);
            return Err(SubmitError::Draining);
        }

        // Queued connections go first; only take the fast path when nobody waits.
        if shared.queued.load(Ordering::SeqCst) == 0 {
            match Arc::clone(&shared.permits).try_acquire_owned() {
                Ok(permit) => {
                    let slot = shared.slot(permit);
                    tracing::trace!(
                        connection_id = %conn.id(),
                        available_permits = shared.permits.available_permits(),
                        "Slot assigned"
                    );
                    tokio::spawn(worker::serve(Arc::clone(shared), conn, slot, guard));
                    return Ok(());
                }
                Err(TryAcquireError::Closed) => {
                    worker::dispatch_rejection(shared, conn, Rejection::Draining, guard);
                    return Err(SubmitError::Draining);
                }
                Err(TryAcquireError::NoPermits) => {}
            }
        }

        self.enqueue(conn, guard)
    }

    fn enqueue(&self, conn: Connection, guard: ConnectionGuard) -> Result<(), SubmitError> {
        let shared = &self.shared;
        let Some(queue) = shared.queue.as_ref() else {
            worker::dispatch_rejection(shared, conn, Rejection::Saturated, guard);
            return Err(SubmitError::Saturated);
        };

        let reserved = shared
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                (queued < shared.queue_depth).then_some(queued + 1)
            })
            .is_ok();
        if !reserved {
            worker::dispatch_rejection(shared, conn, Rejection::Saturated, guard);
            return Err(SubmitError::Saturated);
        }

        let id = conn.id();
        match queue.try_send(Queued { conn, guard }) {
            Ok(()) => {
                tracing::trace!(connection_id = %id, "Connection queued");
                Ok(())
            }
            Err(err) => {
                shared.queued.fetch_sub(1, Ordering::SeqCst);
                let (rejection, error) = match &err {
                    mpsc::error::TrySendError::Full(_) => {
                        (Rejection::Saturated, SubmitError::Saturated)
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        (Rejection::Draining, SubmitError::Draining)
                    }
                };
                let Queued { conn, guard } = err.into_inner();
                worker::dispatch_rejection(shared, conn, rejection, guard);
                Err(error)
            }
        }
    }

    /// Stop admitting work. Queued connections are rejected. Returns `false` if
    /// draining had already begun.
    pub fn begin_drain(&self) -> bool {
        !self.shared.draining.send_replace(true)
    }

    pub fn is_draining(&self) -> bool {
        self.shared.is_draining()
    }

    /// Drain with a deadline, force-closing whatever is still running at it.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        self.drain_or_force(timeout, std::future::pending()).await
    }

    /// Like [`drain`](Self::drain), but `force` resolving ends the wait early.
    pub async fn drain_or_force<F>(&self, timeout: Duration, force: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let in_flight = self.shared.stats.in_flight();
        self.begin_drain();

        tracing::info!(
            in_flight,
            queued = self.queued(),
            timeout_secs = timeout.as_secs_f64(),
            "Draining worker pool"
        );

        let finished = tokio::select! {
            biased;
            _ = force => false,
            result = tokio::time::timeout(timeout, self.shared.tracker.wait_idle()) => result.is_ok(),
        };

        let force_closed = if finished {
            0
        } else {
            let remaining = self.shared.stats.in_flight();
            tracing::warn!(remaining, "Drain incomplete, force-closing connections");
            self.shared.tracker.force_close();
            self.shared.tracker.wait_idle().await;
            remaining
        };

        DrainReport {
            drained: in_flight.saturating_sub(force_closed),
            force_closed,
            queued_rejected: self.shared.queued_rejected.load(Ordering::SeqCst),
            duration: started.elapsed(),
        }
    }

    pub fn monitor(&self) -> PoolMonitor {
        PoolMonitor {
            permits: Arc::clone(&self.shared.permits),
            stats: Arc::clone(&self.shared.stats),
            max_concurrent: self.shared.max_concurrent,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.shared.permits.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.stats.in_flight()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.shared.stats.peak()
    }

    /// Connections waiting for a slot.
    pub fn queued(&self) -> usize {
        self.shared.queued.load(Ordering::SeqCst)
    }

    /// Connections the pool still owns, in any state.
    pub fn tracked(&self) -> usize {
        self.shared.tracker.active_count()
    }
}

/// Grant slots to queued connections in arrival order.
async fn run_queue<H: Handler>(shared: Arc<PoolShared<H>>, mut rx: mpsc::Receiver<Queued>) {
    let mut draining = shared.draining.subscribe();

    loop {
        let next = tokio::select! {
            biased;
            _ = draining.wait_for(|draining| *draining) => None,
            next = rx.recv() => next,
        };
        let Some(queued) = next else { break };

        let permit = tokio::select! {
            biased;
            _ = draining.wait_for(|draining| *draining) => None,
            permit = Arc::clone(&shared.permits).acquire_owned() => permit.ok(),
        };
        shared.queued.fetch_sub(1, Ordering::SeqCst);

        match permit {
            Some(permit) => {
                let slot = shared.slot(permit);
                tokio::spawn(worker::serve(Arc::clone(&shared), queued.conn, slot, queued.guard));
            }
            None => {
                reject_queued(&shared, queued);
                break;
            }
        }
    }

    rx.close();
    while let Some(queued) = rx.recv().await {
        shared.queued.fetch_sub(1, Ordering::SeqCst);
        reject_queued(&shared, queued);
    }
}

fn reject_queued<H: Handler>(shared: &Arc<PoolShared<H>>, queued: Queued) {
    shared.queued_rejected.fetch_add(1, Ordering::SeqCst);
    worker::dispatch_rejection(shared, queued.conn, Rejection::Draining, queued.guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Framing, LimitsConfig};
    use crate::http::{handler_fn, Request, Response};
    use http::StatusCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    struct Harness {
        listener: TcpListener,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
            }
        }

        /// Connect a client, send a request, and return both ends.
        async fn connect(&self) -> (Connection, TcpStream) {
            self.connect_to("/").await
        }

        async fn connect_to(&self, path: &str) -> (Connection, TcpStream) {
            let mut client = TcpStream::connect(self.listener.local_addr().unwrap())
                .await
                .unwrap();
            let request = format!("GET {path} HTTP/1.1\r\n\r\n");
            client.write_all(request.as_bytes()).await.unwrap();
            let (stream, peer) = self.listener.accept().await.unwrap();
            let limits = LimitsConfig {
                max_request_bytes: 1024,
                framing: Framing::HeaderTerminator,
            };
            (Connection::new(stream, peer, limits), client)
        }
    }

    async fn response_of(mut client: TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let _ = client.read_to_end(&mut buf).await;
        buf
    }

    fn pool_config(max_concurrent: usize, queue_depth: usize) -> PoolConfig {
        PoolConfig {
            max_concurrent,
            queue_depth,
            reject_mode: RejectMode::Response,
        }
    }

    fn gated_handler(gate: Arc<Semaphore>) -> impl Handler {
        handler_fn(move |_req: Request| {
            let gate = gate.clone();
            async move {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
                Response::text(StatusCode::OK, "text/plain", "done")
            }
        })
    }

    #[tokio::test]
    async fn rejects_when_full_without_queue() {
        let harness = Harness::new().await;
        let gate = Arc::new(Semaphore::new(0));
        let pool = WorkerPool::new(&pool_config(1, 0), &TimeoutConfig::default(), gated_handler(gate.clone()));

        let (first, first_client) = harness.connect().await;
        let (second, second_client) = harness.connect().await;

        assert_eq!(pool.submit(first), Ok(()));
        assert_eq!(pool.submit(second), Err(SubmitError::Saturated));

        let rejected = response_of(second_client).await;
        assert!(rejected.starts_with(b"HTTP/1.1 429"));

        gate.add_permits(1);
        let served = response_of(first_client).await;
        assert!(served.ends_with(b"done"));
    }

    #[tokio::test]
    async fn queued_connections_wait_for_a_slot() {
        let harness = Harness::new().await;
        let gate = Arc::new(Semaphore::new(0));
        let pool = WorkerPool::new(&pool_config(1, 1), &TimeoutConfig::default(), gated_handler(gate.clone()));

        let (first, first_client) = harness.connect().await;
        let (second, second_client) = harness.connect().await;
        let (third, third_client) = harness.connect().await;

        assert_eq!(pool.submit(first), Ok(()));
        assert_eq!(pool.submit(second), Ok(()));
        assert_eq!(pool.queued(), 1);
        assert_eq!(pool.submit(third), Err(SubmitError::Saturated));
        assert!(response_of(third_client).await.starts_with(b"HTTP/1.1 429"));

        gate.add_permits(2);
        assert!(response_of(first_client).await.ends_with(b"done"));
        assert!(response_of(second_client).await.ends_with(b"done"));
        assert_eq!(pool.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn queued_connections_are_served_in_arrival_order() {
        let harness = Harness::new().await;
        let gate = Arc::new(Semaphore::new(0));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handler = {
            let gate = gate.clone();
            let seen = seen.clone();
            handler_fn(move |req: Request| {
                seen.lock().unwrap().push(req.path().unwrap_or("?").to_string());
                let gate = gate.clone();
                async move {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                    Response::text(StatusCode::OK, "text/plain", "done")
                }
            })
        };
        let pool = WorkerPool::new(&pool_config(1, 4), &TimeoutConfig::default(), handler);

        let mut clients = Vec::new();
        for path in ["/a", "/b", "/c", "/d"] {
            let (conn, client) = harness.connect_to(path).await;
            assert_eq!(pool.submit(conn), Ok(()));
            clients.push(client);
        }
        assert_eq!(pool.queued(), 3);

        gate.add_permits(4);
        for client in clients {
            assert!(response_of(client).await.ends_with(b"done"));
        }

        assert_eq!(*seen.lock().unwrap(), ["/a", "/b", "/c", "/d"]);
        assert_eq!(pool.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn drain_rejects_queued_and_finishes_in_flight() {
        let harness = Harness::new().await;
        let gate = Arc::new(Semaphore::new(0));
        let pool = WorkerPool::new(&pool_config(1, 4), &TimeoutConfig::default(), gated_handler(gate.clone()));

        let (first, first_client) = harness.connect().await;
        let (second, second_client) = harness.connect().await;
        pool.submit(first).unwrap();
        pool.submit(second).unwrap();

        let drain = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain(Duration::from_secs(5)).await })
        };

        assert!(response_of(second_client).await.starts_with(b"HTTP/1.1 503"));
        gate.add_permits(1);
        assert!(response_of(first_client).await.ends_with(b"done"));

        let report = drain.await.unwrap();
        assert_eq!(report.force_closed, 0);
        assert_eq!(report.queued_rejected, 1);
        assert_eq!(pool.tracked(), 0);

        let (late, late_client) = harness.connect().await;
        assert_eq!(pool.submit(late), Err(SubmitError::Draining));
        assert!(response_of(late_client).await.starts_with(b"HTTP/1.1 503"));
    }

    #[tokio::test]
    async fn drain_deadline_force_closes() {
        let harness = Harness::new().await;
        let gate = Arc::new(Semaphore::new(0));
        let pool = WorkerPool::new(&pool_config(2, 0), &TimeoutConfig::default(), gated_handler(gate));

        let (conn, client) = harness.connect().await;
        pool.submit(conn).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = pool.drain(Duration::from_millis(100)).await;
        assert_eq!(report.force_closed, 1);
        assert_eq!(pool.available_permits(), 2);
        assert!(response_of(client).await.is_empty());
    }
}
