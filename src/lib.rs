//! One-request-per-connection TCP server core.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::ServerConfig;
pub use crate::http::{handler_fn, FixedResponse, Handler, Request, Response};
pub use lifecycle::{Server, ServerHandle, Shutdown};
