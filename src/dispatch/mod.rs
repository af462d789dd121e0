//! Dispatcher subsystem: bounds how many connections are processed at once.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → pool.rs (submit: slot free? queue room? draining?)
//!         ├─ slot free      → worker.rs serve (read → handle → write → close)
//!         ├─ queue has room → FIFO queue → slot granted → serve
//!         └─ otherwise      → worker.rs reject (429/503 or reset)
//!     → slot.rs (permit released when the connection closes)
//!     → tracker.rs (drain waits here; force-close signalled here)
//! ```
//!
//! # Design Decisions
//! - The permit semaphore and its counters are the only state shared between workers
//! - A connection never holds a slot while queued

pub mod pool;
pub mod slot;
pub mod tracker;
pub mod worker;

pub use pool::{DrainReport, PoolMonitor, SubmitError, WorkerPool, WorkerSettings};
pub use slot::{Slot, SlotStats};
pub use tracker::{ConnectionGuard, ConnectionTracker};
pub use worker::{Outcome, Rejection};
