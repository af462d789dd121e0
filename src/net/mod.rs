//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept, close)
//!     → connection.rs (framed read, single write, state machine)
//!     → Hand off to the dispatcher
//!
//! Connection States:
//!     Reading → Handling → Writing → Closed
//! ```
//!
//! # Design Decisions
//! - One request and one response per connection; no keep-alive
//! - Every read and write carries a deadline

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionError, ConnectionId, ConnectionState};
pub use listener::{Accepted, Listener, ListenerError};
