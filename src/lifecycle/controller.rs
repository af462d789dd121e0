//! Server lifecycle: Starting → Running → Draining → Stopped.
//!
//! [`Server::bind`] is the Starting phase; any failure there is fatal.
//! [`Server::run`] consumes the server, so a Stopped server cannot be
//! restarted; a new one has to be bound.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::{PoolMonitor, WorkerPool};
use crate::http::Handler;
use crate::lifecycle::Shutdown;
use crate::net::{Accepted, Listener, ListenerError};
use crate::observability::metrics;
use crate::resilience::Backoff;

const ACCEPT_BACKOFF_BASE_MS: u64 = 10;
const ACCEPT_BACKOFF_MAX_MS: u64 = 1_000;

/// Process-fatal errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(String),
}

/// Lifecycle phase. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

#[derive(Debug)]
struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(Phase::Starting as u8))
    }

    fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` if that is forward. Returns whether the phase changed.
    fn advance(&self, next: Phase) -> bool {
        let previous = self.0.fetch_max(next as u8, Ordering::AcqRel);
        previous < next as u8
    }
}

/// Summary returned when the server stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownStats {
    /// In-flight connections that completed during the drain.
    pub drained: usize,
    /// Connections force-closed at the drain deadline or on a forced shutdown.
    pub force_closed: usize,
    /// Queued connections rejected because draining began.
    pub rejected_queued: usize,
    /// Time from the shutdown request to Stopped.
    pub duration: Duration,
}

/// Cloneable handle for observing and stopping a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    phase: Arc<PhaseCell>,
    shutdown: Shutdown,
    monitor: PoolMonitor,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Request shutdown. A second call forces in-flight connections closed.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn monitor(&self) -> &PoolMonitor {
        &self.monitor
    }
}

/// A bound server, ready to run.
pub struct Server<H> {
    listener: Arc<Listener>,
    pool: WorkerPool<H>,
    phase: Arc<PhaseCell>,
    shutdown: Shutdown,
    drain_timeout: Duration,
}

impl<H: Handler> Server<H> {
    /// Bind the listener and build the worker pool.
    pub async fn bind(config: &ServerConfig, handler: H) -> Result<Self, ServerError> {
        let phase = Arc::new(PhaseCell::new());

        let listener = Listener::bind(&config.listener)
            .await?
            .with_limits(config.limits.clone());
        let pool = WorkerPool::new(&config.pool, &config.timeouts, handler);

        Ok(Self {
            listener: Arc::new(listener),
            pool,
            phase,
            shutdown: Shutdown::new(),
            drain_timeout: config.timeouts.drain(),
        })
    }

    /// Use an externally owned shutdown signal, e.g. one wired to OS signals.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            local_addr: self.listener.local_addr(),
            phase: Arc::clone(&self.phase),
            shutdown: self.shutdown.clone(),
            monitor: self.pool.monitor(),
        }
    }

    /// Accept connections until shutdown is requested, then drain and stop.
    pub async fn run(self) -> ShutdownStats {
        self.phase.advance(Phase::Running);
        tracing::info!(address = %self.listener.local_addr(), "Server running");

        let acceptor = tokio::spawn(accept_loop(
            Arc::clone(&self.listener),
            self.pool.clone(),
        ));

        self.shutdown.triggered().await;
        let started = Instant::now();
        self.phase.advance(Phase::Draining);
        tracing::info!(
            in_flight = self.pool.in_flight(),
            queued = self.pool.queued(),
            "Server draining"
        );

        self.listener.close();
        self.pool.begin_drain();
        if let Err(e) = acceptor.await {
            tracing::error!(error = %e, "Accept loop terminated abnormally");
        }

        let report = self
            .pool
            .drain_or_force(self.drain_timeout, self.shutdown.forced())
            .await;

        self.phase.advance(Phase::Stopped);
        let stats = ShutdownStats {
            drained: report.drained,
            force_closed: report.force_closed,
            rejected_queued: report.queued_rejected,
            duration: started.elapsed(),
        };
        tracing::info!(
            drained = stats.drained,
            force_closed = stats.force_closed,
            rejected_queued = stats.rejected_queued,
            duration_ms = stats.duration.as_millis() as u64,
            "Server stopped"
        );
        stats
    }
}

async fn accept_loop<H: Handler>(listener: Arc<Listener>, pool: WorkerPool<H>) {
    let mut backoff = Backoff::new(ACCEPT_BACKOFF_BASE_MS, ACCEPT_BACKOFF_MAX_MS);

    loop {
        match listener.accept().await {
            Ok(Accepted::Connection(conn)) => {
                backoff.reset();
                metrics::record_accepted();
                let id = conn.id();
                if let Err(e) = pool.submit(conn) {
                    tracing::debug!(
                        connection_id = %id,
                        reason = %e,
                        available_permits = pool.available_permits(),
                        "Connection not admitted"
                    );
                }
            }
            Ok(Accepted::Shutdown) => break,
            Err(e) => {
                metrics::record_accept_error();
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "Accept failed, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = listener.closed() => break,
                }
            }
        }
    }
    tracing::debug!("Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::FixedResponse;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn local_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config
    }

    #[test]
    fn phase_only_moves_forward() {
        let cell = PhaseCell::new();
        assert!(cell.advance(Phase::Running));
        assert!(cell.advance(Phase::Stopped));
        assert!(!cell.advance(Phase::Draining));
        assert_eq!(cell.get(), Phase::Stopped);
    }

    #[tokio::test]
    async fn runs_and_stops() {
        let server = Server::bind(&local_config(), FixedResponse::default())
            .await
            .unwrap();
        let handle = server.handle();
        assert_eq!(handle.phase(), Phase::Starting);

        let running = tokio::spawn(server.run());

        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.ends_with(b"Hello, World!"));
        assert_eq!(handle.phase(), Phase::Running);

        handle.shutdown();
        let stats = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.force_closed, 0);
        assert_eq!(handle.phase(), Phase::Stopped);
        assert!(TcpStream::connect(handle.local_addr()).await.is_err());
    }
}
