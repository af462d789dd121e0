//! Connection state machine and framed request/response I/O.
//!
//! # Responsibilities
//! - Track connection state (Reading → Handling → Writing → Closed)
//! - Generate unique connection IDs for tracing
//! - Read exactly one framed request under a deadline
//! - Write exactly one response under a deadline
//!
//! # Design Decisions
//! - States only move forward; skipping ahead is allowed, going back is not
//! - A write either sends every byte or fails
//! - Closing half-closes first and briefly discards unread input so the peer
//!   sees our response before the socket goes away

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::config::{Framing, LimitsConfig};
use crate::http::request::find_head_end;
use crate::http::{Request, Response};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How long `close` keeps discarding unread input before dropping the socket.
const LINGER: Duration = Duration::from_millis(100);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Waiting for the request.
    Reading,
    /// Request read; the handler is running.
    Handling,
    /// Response being written.
    Writing,
    /// Socket released.
    Closed,
}

/// Connection-scoped failures. None of these affect other connections.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("deadline elapsed")]
    Timeout,

    #[error("peer closed the connection before sending a request")]
    PeerClosed,

    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection already closed")]
    Closed,

    #[error("cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

/// One accepted socket, owned by exactly one worker.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: Option<TcpStream>,
    peer_addr: SocketAddr,
    state: ConnectionState,
    accepted_at: Instant,
    limits: LimitsConfig,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, limits: LimitsConfig) -> Self {
        Self {
            id: ConnectionId::new(),
            stream: Some(stream),
            peer_addr,
            state: ConnectionState::Reading,
            accepted_at: Instant::now(),
            limits,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn accepted_at(&self) -> Instant {
        self.accepted_at
    }

    fn advance(&mut self, next: ConnectionState) -> Result<(), ConnectionError> {
        if next <= self.state {
            return Err(ConnectionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Read one request, framed according to the configured limits.
    ///
    /// On success the connection moves to `Handling`.
    pub async fn read_request(&mut self, timeout: Duration) -> Result<Request, ConnectionError> {
        if self.state != ConnectionState::Reading {
            return Err(ConnectionError::InvalidTransition {
                from: self.state,
                to: ConnectionState::Reading,
            });
        }
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
        let limit = self.limits.max_request_bytes;
        let framing = self.limits.framing;

        let mut buf = vec![0u8; limit];
        let filled = tokio::time::timeout(timeout, read_framed(stream, &mut buf, framing))
            .await
            .map_err(|_| ConnectionError::Timeout)??;
        buf.truncate(filled);

        self.advance(ConnectionState::Handling)?;
        Ok(Request::new(Bytes::from(buf), self.peer_addr))
    }

    /// Write the whole response, or fail.
    pub async fn write_response(
        &mut self,
        response: &Response,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        self.advance(ConnectionState::Writing)?;
        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;

        tokio::time::timeout(timeout, async {
            stream.write_all(response.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ConnectionError::Timeout)??;

        Ok(())
    }

    /// Graceful close. Safe to call more than once.
    pub async fn close(&mut self) {
        self.state = ConnectionState::Closed;
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = stream.shutdown().await {
            tracing::trace!(connection_id = %self.id, error = %e, "Shutdown failed");
            return;
        }

        let mut sink = [0u8; 512];
        let _ = tokio::time::timeout(LINGER, async {
            while let Ok(n) = stream.read(&mut sink).await {
                if n == 0 {
                    break;
                }
            }
        })
        .await;
    }

    /// Abortive close: the peer sees a reset instead of an orderly FIN.
    pub fn reset(&mut self) {
        self.state = ConnectionState::Closed;
        let Some(stream) = self.stream.take() else {
            return;
        };

        if let Err(e) = socket2::SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
            tracing::debug!(connection_id = %self.id, error = %e, "Failed to set SO_LINGER");
        }
        drop(stream);
    }
}

/// Fill `buf` until the framing rule says the request is complete.
async fn read_framed(
    stream: &mut TcpStream,
    buf: &mut [u8],
    framing: Framing,
) -> Result<usize, ConnectionError> {
    let limit = buf.len();
    let mut filled = 0;

    loop {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Err(ConnectionError::PeerClosed)
            } else {
                Ok(filled)
            };
        }

        let scanned = filled;
        filled += n;

        if framing == Framing::HeaderTerminator
            && find_head_end(&buf[..filled], scanned).is_some()
        {
            return Ok(filled);
        }
        if filled == limit {
            // Exactly `limit` bytes is fine if the peer has finished sending.
            let mut next = [0u8; 1];
            return match stream.read(&mut next).await? {
                0 => Ok(filled),
                _ => Err(ConnectionError::RequestTooLarge { limit }),
            };
        }
    }
}
