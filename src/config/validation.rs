//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool size > 0)
//! - Check addresses parse and status codes are real
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("response.status {0} is not a valid HTTP status code")]
    InvalidStatus(u16),

    #[error("observability.log_level {0:?} is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::Zero { field: "listener.backlog" });
    }
    if config.pool.max_concurrent == 0 {
        errors.push(ValidationError::Zero { field: "pool.max_concurrent" });
    }

    let timeouts = [
        ("timeouts.read_ms", config.timeouts.read_ms),
        ("timeouts.write_ms", config.timeouts.write_ms),
        ("timeouts.connection_ms", config.timeouts.connection_ms),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.limits.max_request_bytes == 0 {
        errors.push(ValidationError::Zero { field: "limits.max_request_bytes" });
    }

    if http::StatusCode::from_u16(config.response.status).is_err() {
        errors.push(ValidationError::InvalidStatus(config.response.status));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
