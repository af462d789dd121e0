//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener, dispatcher and lifecycle produce:
//!     → logging.rs (structured log events, connection_id on every line)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
