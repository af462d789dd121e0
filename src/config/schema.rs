//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, backlog).
    pub listener: ListenerConfig,

    /// Worker pool sizing and rejection behaviour.
    pub pool: PoolConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request framing limits.
    pub limits: LimitsConfig,

    /// The fixed response served by the default handler.
    pub response: ResponseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Pending connection backlog passed to `listen(2)`.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            backlog: 1024,
        }
    }
}

/// What a rejected connection receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectMode {
    /// Write a best-effort error response, then close.
    Response,
    /// Abortive close (RST) without writing anything.
    Reset,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections processed simultaneously.
    pub max_concurrent: usize,

    /// Connections allowed to wait for a slot. 0 rejects as soon as the pool is full.
    pub queue_depth: usize,

    /// How connections over capacity are turned away.
    pub reject_mode: RejectMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            queue_depth: 128,
            reject_mode: RejectMode::Response,
        }
    }
}

/// Timeout configuration for connection processing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for reading one request, in milliseconds.
    pub read_ms: u64,

    /// Deadline for writing one response, in milliseconds.
    pub write_ms: u64,

    /// Overall per-connection deadline covering read and handling, in milliseconds.
    pub connection_ms: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }

    pub fn connection(&self) -> Duration {
        Duration::from_millis(self.connection_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_ms: 5_000,
            write_ms: 5_000,
            connection_ms: 10_000,
            drain_secs: 30,
        }
    }
}

/// Rule that decides where a request ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// The request ends when the peer half-closes its write side.
    EndOfStream,
    /// The request ends at the blank line closing the request head, or at end of stream.
    HeaderTerminator,
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request accepted, in bytes.
    pub max_request_bytes: usize,

    /// Framing rule applied when reading a request.
    pub framing: Framing,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 1024,
            framing: Framing::HeaderTerminator,
        }
    }
}

/// Fixed response served by the default handler.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// HTTP status code.
    pub status: u16,

    /// Value of the Content-Type header.
    pub content_type: String,

    /// Response body.
    pub body: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/plain".to_string(),
            body: "Hello, World!".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Pretty,
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
