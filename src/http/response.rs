//! Response bytes and the canned error responses the core writes itself.
//!
//! # Design Decisions
//! - A response is an immutable byte buffer written verbatim
//! - Every response built here carries `Connection: close`; there is no keep-alive
//! - Error bodies are the status reason phrase, as plain text

use bytes::Bytes;
use http::StatusCode;

/// One response to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    bytes: Bytes,
}

impl Response {
    /// Wrap bytes that already form a complete response.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Build an HTTP/1.1 response with a body and explicit length.
    pub fn text(status: StatusCode, content_type: &str, body: &str) -> Self {
        let reason = status.canonical_reason().unwrap_or("");
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status.as_u16(),
            reason,
            content_type,
            body.len()
        );

        let mut bytes = Vec::with_capacity(head.len() + body.len());
        bytes.extend_from_slice(head.as_bytes());
        bytes.extend_from_slice(body.as_bytes());
        Self::from_bytes(bytes)
    }

    /// Plain-text response whose body is the status reason phrase.
    pub fn error(status: StatusCode) -> Self {
        Self::text(status, "text/plain", status.canonical_reason().unwrap_or("Error"))
    }

    /// Fallback written when the handler overruns the connection deadline.
    pub fn internal_error() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Status code from the status line, if the bytes start with one.
    pub fn status(&self) -> Option<StatusCode> {
        let line = self.bytes.split(|b| *b == b'\r').next()?;
        let code = line.split(|b| *b == b' ').nth(1)?;
        StatusCode::from_bytes(code).ok()
    }
}
