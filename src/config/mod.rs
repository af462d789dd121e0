//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI flag overrides (main.rs)
//!     → ServerConfig (validated, immutable)
//!     → shared with listener, dispatcher, lifecycle
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    Framing, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, PoolConfig,
    RejectMode, ResponseConfig, ServerConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
