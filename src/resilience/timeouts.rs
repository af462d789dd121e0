//! Timeout enforcement.
//!
//! # Responsibilities
//! - Track the overall per-connection deadline
//! - Clamp per-operation timeouts (read, handle) to what remains of it
//!
//! # Design Decisions
//! - Uses Tokio's clock so paused-time tests stay deterministic
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, Timeout};

/// A fixed point in time after which work on a connection is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The shorter of `timeout` and the time left before the deadline.
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }

    /// Run `future` until it completes or the deadline passes.
    pub fn run<F: Future>(&self, future: F) -> Timeout<F> {
        tokio::time::timeout_at(self.at, future)
    }
}
