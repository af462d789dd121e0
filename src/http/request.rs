//! Request bytes and a best-effort parsed view of the request head.
//!
//! # Responsibilities
//! - Hold the raw bytes read from the connection, unchanged
//! - Locate the blank line that terminates a request head
//! - Expose method, path, version and headers when they parse
//!
//! # Design Decisions
//! - Parsing never rejects a request; a malformed head simply has no view
//! - Headers are only exposed when the head parsed completely

use std::net::SocketAddr;

use bytes::Bytes;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const MAX_HEADERS: usize = 32;

/// Position just past the `\r\n\r\n` closing the request head, if present.
///
/// `from` lets repeated reads skip bytes already scanned.
pub fn find_head_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEAD_TERMINATOR.len() - 1);
    buf.get(start..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| start + pos + HEAD_TERMINATOR.len())
}

/// Parsed request line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    /// Minor HTTP version (`1` for HTTP/1.1), when the request line was complete.
    pub version: Option<u8>,
    pub headers: Vec<(String, Bytes)>,
}

impl RequestHead {
    fn parse(raw: &Bytes) -> Option<Self> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        let status = req.parse(raw).ok()?;

        let method = req.method?.to_string();
        let path = req.path?.to_string();
        let headers = if status.is_complete() {
            req.headers
                .iter()
                .map(|h| (h.name.to_string(), raw.slice_ref(h.value)))
                .collect()
        } else {
            Vec::new()
        };

        Some(Self {
            method,
            path,
            version: req.version,
            headers,
        })
    }
}

/// One request read from a connection.
#[derive(Debug, Clone)]
pub struct Request {
    raw: Bytes,
    head: Option<RequestHead>,
    peer_addr: SocketAddr,
}

impl Request {
    pub fn new(raw: Bytes, peer_addr: SocketAddr) -> Self {
        let head = RequestHead::parse(&raw);
        Self {
            raw,
            head,
            peer_addr,
        }
    }

    /// The request exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn head(&self) -> Option<&RequestHead> {
        self.head.as_ref()
    }

    pub fn method(&self) -> Option<&str> {
        self.head.as_ref().map(|h| h.method.as_str())
    }

    pub fn path(&self) -> Option<&str> {
        self.head.as_ref().map(|h| h.path.as_str())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.head
            .as_ref()?
            .headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_ref())
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
