//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept loop:
//!     → accept error → backoff.rs (exponential delay with jitter) → retry
//!
//! Per connection:
//!     → timeouts.rs (overall deadline, clamps read and handler time)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every suspension point has a deadline
//! - Accept errors are transient and never stop the server

pub mod backoff;
pub mod timeouts;

pub use backoff::{calculate_backoff, Backoff};
pub use timeouts::Deadline;
