//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Metrics → Bind listener → Build pool → Wire signals → Run
//!
//! Run (controller.rs):
//!     Starting → Running (accept loop) → Draining → Stopped
//!
//! Shutdown (shutdown.rs):
//!     Request received → Stop accepting → Drain connections → Stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     Second signal  → Force-close remaining connections
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced close after deadline

pub mod controller;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use controller::{Phase, Server, ServerError, ServerHandle, ShutdownStats};
pub use shutdown::Shutdown;
