//! Per-connection work: read, handle, write, close.
//!
//! Each admitted connection runs [`serve`] on its own task while holding a
//! [`Slot`]. Rejected connections run [`reject`] instead, which writes a
//! best-effort error response without ever taking a slot.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;

use crate::config::RejectMode;
use crate::dispatch::pool::PoolShared;
use crate::dispatch::slot::Slot;
use crate::dispatch::tracker::ConnectionGuard;
use crate::http::{Handler, Response};
use crate::net::{Connection, ConnectionError};
use crate::observability::metrics;
use crate::resilience::Deadline;

/// Why a connection was turned away without being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Every slot is taken and the wait queue is full.
    Saturated,
    /// The server is shutting down.
    Draining,
}

impl Rejection {
    pub fn response(&self) -> Response {
        match self {
            Rejection::Saturated => Response::error(StatusCode::TOO_MANY_REQUESTS),
            Rejection::Draining => Response::error(StatusCode::SERVICE_UNAVAILABLE),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::Saturated => "saturated",
            Rejection::Draining => "draining",
        }
    }
}

/// How a served connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    HandlerTimeout,
    HandlerPanicked,
    ReadTimeout,
    TooLarge,
    PeerClosed,
    ReadFailed,
    WriteFailed,
    ForceClosed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Handled => "handled",
            Outcome::HandlerTimeout => "handler_timeout",
            Outcome::HandlerPanicked => "handler_panicked",
            Outcome::ReadTimeout => "read_timeout",
            Outcome::TooLarge => "too_large",
            Outcome::PeerClosed => "peer_closed",
            Outcome::ReadFailed => "read_failed",
            Outcome::WriteFailed => "write_failed",
            Outcome::ForceClosed => "force_closed",
        }
    }
}

/// Serve one connection end to end, then release its slot.
pub(crate) async fn serve<H: Handler>(
    shared: Arc<PoolShared<H>>,
    mut conn: Connection,
    slot: Slot,
    _guard: ConnectionGuard,
) {
    let outcome = tokio::select! {
        biased;
        _ = shared.tracker.force_closed() => Outcome::ForceClosed,
        outcome = process(&shared, &mut conn) => outcome,
    };

    if outcome == Outcome::ForceClosed {
        tracing::warn!(connection_id = %conn.id(), state = ?conn.state(), "Force-closing connection");
        conn.reset();
    } else {
        conn.close().await;
    }
    drop(slot);

    let elapsed = conn.accepted_at().elapsed();
    metrics::record_request(outcome.as_str(), elapsed);
    tracing::debug!(
        connection_id = %conn.id(),
        outcome = outcome.as_str(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Connection finished"
    );
}

async fn process<H: Handler>(shared: &PoolShared<H>, conn: &mut Connection) -> Outcome {
    let settings = &shared.settings;
    let deadline = Deadline::after(settings.connection_timeout);

    let (response, outcome) = match conn.read_request(deadline.clamp(settings.read_timeout)).await {
        Ok(request) => {
            tracing::debug!(
                connection_id = %conn.id(),
                peer_addr = %conn.peer_addr(),
                bytes = request.len(),
                request = %String::from_utf8_lossy(request.as_bytes()),
                "Request received"
            );
            // Call the handler inside the future so a panic before its first
            // await is caught too.
            let handled = AssertUnwindSafe(async { shared.handler.handle(request).await })
                .catch_unwind();
            match deadline.run(handled).await {
                Ok(Ok(response)) => (response, Outcome::Handled),
                Ok(Err(panic)) => {
                    tracing::error!(
                        connection_id = %conn.id(),
                        panic = panic_message(panic.as_ref()),
                        "Handler panicked"
                    );
                    (Response::internal_error(), Outcome::HandlerPanicked)
                }
                Err(_) => {
                    tracing::warn!(
                        connection_id = %conn.id(),
                        timeout_ms = settings.connection_timeout.as_millis() as u64,
                        "Handler exceeded connection deadline"
                    );
                    (Response::internal_error(), Outcome::HandlerTimeout)
                }
            }
        }
        Err(ConnectionError::PeerClosed) => {
            tracing::debug!(connection_id = %conn.id(), "Peer closed without sending a request");
            return Outcome::PeerClosed;
        }
        Err(ConnectionError::Timeout) => {
            tracing::debug!(connection_id = %conn.id(), "Request read timed out");
            (Response::error(StatusCode::REQUEST_TIMEOUT), Outcome::ReadTimeout)
        }
        Err(ConnectionError::RequestTooLarge { limit }) => {
            tracing::debug!(connection_id = %conn.id(), limit, "Request too large");
            (Response::error(StatusCode::PAYLOAD_TOO_LARGE), Outcome::TooLarge)
        }
        Err(e) => {
            tracing::debug!(connection_id = %conn.id(), error = %e, "Request read failed");
            return Outcome::ReadFailed;
        }
    };

    if let Err(e) = conn.write_response(&response, settings.write_timeout).await {
        tracing::debug!(connection_id = %conn.id(), error = %e, "Response write failed");
        return Outcome::WriteFailed;
    }
    outcome
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Turn a connection away, per the configured reject mode.
///
/// Draining rejections always get a response so they are never silently dropped.
pub(crate) fn dispatch_rejection<H: Handler>(
    shared: &Arc<PoolShared<H>>,
    mut conn: Connection,
    rejection: Rejection,
    guard: ConnectionGuard,
) {
    metrics::record_rejected(rejection.as_str());
    tracing::debug!(
        connection_id = %conn.id(),
        peer_addr = %conn.peer_addr(),
        reason = rejection.as_str(),
        "Connection rejected"
    );

    if rejection == Rejection::Saturated && shared.reject_mode == RejectMode::Reset {
        conn.reset();
        return;
    }
    tokio::spawn(reject(Arc::clone(shared), conn, rejection, guard));
}

async fn reject<H: Handler>(
    shared: Arc<PoolShared<H>>,
    mut conn: Connection,
    rejection: Rejection,
    _guard: ConnectionGuard,
) {
    let response = rejection.response();
    let written = tokio::select! {
        biased;
        _ = shared.tracker.force_closed() => None,
        result = conn.write_response(&response, shared.settings.write_timeout) => Some(result),
    };

    match written {
        None => conn.reset(),
        Some(result) => {
            if let Err(e) = result {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Rejection write failed");
            }
            conn.close().await;
        }
    }
}
