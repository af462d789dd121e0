//! Request/response handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection::read_request
//!     → request.rs (raw bytes + parsed head)
//!     → handler.rs (Handler::handle, pluggable)
//!     → response.rs (bytes written verbatim)
//!     → Connection::write_response
//! ```

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{handler_fn, FixedResponse, Handler, HandlerFn};
pub use request::{Request, RequestHead};
pub use response::Response;
