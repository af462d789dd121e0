//! TCP listener implementation with an explicit close.
//!
//! # Responsibilities
//! - Bind to the configured address with the configured backlog
//! - Accept incoming TCP connections and wrap them as [`Connection`]s
//! - Close idempotently, waking any blocked `accept()`
//!
//! # Design Decisions
//! - Admission control lives in the dispatcher, not here
//! - A closed listener answers `accept()` with [`Accepted::Shutdown`], never an error
//! - The socket is released as soon as the last in-progress accept returns

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

use crate::config::{LimitsConfig, ListenerConfig};
use crate::net::connection::Connection;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address does not parse.
    #[error("Invalid bind address {0:?}")]
    InvalidAddress(String),
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection. Transient.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// Result of a successful call to [`Listener::accept`].
#[derive(Debug)]
pub enum Accepted {
    Connection(Connection),
    /// The listener was closed.
    Shutdown,
}

/// A TCP listener that can be closed from another task.
#[derive(Debug)]
pub struct Listener {
    socket: Mutex<Option<Arc<TcpListener>>>,
    closed: watch::Sender<bool>,
    local_addr: SocketAddr,
    limits: LimitsConfig,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ListenerError::InvalidAddress(config.bind_address.clone()))?;

        let listener = listen(addr, config.backlog)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            address = %local_addr,
            backlog = config.backlog,
            "Listener bound"
        );

        let (closed, _) = watch::channel(false);
        Ok(Self {
            socket: Mutex::new(Some(Arc::new(listener))),
            closed,
            local_addr,
            limits: LimitsConfig::default(),
        })
    }

    /// Framing limits handed to every accepted connection.
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Accept the next connection.
    ///
    /// Returns [`Accepted::Shutdown`] once [`close`](Self::close) has been called,
    /// including for an accept that was already waiting.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let mut closed = self.closed.subscribe();
        let Some(socket) = self.current() else {
            return Ok(Accepted::Shutdown);
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => Ok(Accepted::Shutdown),
            result = socket.accept() => {
                let (stream, peer_addr) = result.map_err(ListenerError::Accept)?;
                let connection = Connection::new(stream, peer_addr, self.limits.clone());

                tracing::debug!(
                    connection_id = %connection.id(),
                    peer_addr = %peer_addr,
                    "Connection accepted"
                );
                Ok(Accepted::Connection(connection))
            }
        }
    }

    /// Stop accepting and release the socket. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let socket = self
            .socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.closed.send_replace(true);

        if socket.is_some() {
            tracing::info!(address = %self.local_addr, "Listener closed");
            true
        } else {
            false
        }
    }

    /// Resolves once the listener has been closed.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn current(&self) -> Option<Arc<TcpListener>> {
        self.socket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn listen(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpStream;

    fn local() -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            backlog: 16,
        }
    }

    #[tokio::test]
    async fn accepts_connections() {
        let listener = Listener::bind(&local()).await.unwrap();
        let addr = listener.local_addr();
        let client = TcpStream::connect(addr).await.unwrap();

        match listener.accept().await.unwrap() {
            Accepted::Connection(conn) => {
                assert_eq!(conn.peer_addr(), client.local_addr().unwrap());
            }
            Accepted::Shutdown => panic!("listener reported shutdown"),
        }
    }

    #[tokio::test]
    async fn close_wakes_blocked_accept() {
        let listener = Arc::new(Listener::bind(&local()).await.unwrap());
        let acceptor = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(listener.close());
        assert!(!listener.close());
        assert!(listener.is_closed());

        let accepted = tokio::time::timeout(Duration::from_secs(1), acceptor)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(accepted, Accepted::Shutdown));
        assert!(matches!(listener.accept().await.unwrap(), Accepted::Shutdown));
    }

    #[tokio::test]
    async fn close_releases_the_port() {
        let listener = Listener::bind(&local()).await.unwrap();
        let addr = listener.local_addr();
        listener.close();

        let rebound = Listener::bind(&ListenerConfig {
            bind_address: addr.to_string(),
            backlog: 16,
        })
        .await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let first = Listener::bind(&local()).await.unwrap();
        let taken = ListenerConfig {
            bind_address: first.local_addr().to_string(),
            backlog: 16,
        };
        // SO_REUSEADDR does not allow two live listeners on one port.
        assert!(matches!(
            Listener::bind(&taken).await,
            Err(ListenerError::Bind { .. })
        ));
    }

    #[tokio::test]
    async fn unparsable_address() {
        let config = ListenerConfig {
            bind_address: "localhost".into(),
            backlog: 16,
        };
        assert!(matches!(
            Listener::bind(&config).await,
            Err(ListenerError::InvalidAddress(_))
        ));
    }
}
