//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Bind the listener and build the worker pool
//! - Wire OS signals to shutdown, then serve until stopped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::net::SocketAddr;

use crate::config::ServerConfig;
use crate::http::Handler;
use crate::lifecycle::controller::{Server, ServerError, ShutdownStats};
use crate::lifecycle::signals::spawn_signal_handler;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Run a server with `handler` until a termination signal stops it.
pub async fn run<H: Handler>(config: ServerConfig, handler: H) -> Result<ShutdownStats, ServerError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ServerError::Metrics(e.to_string()))?;
        metrics::init_metrics(addr).map_err(|e| ServerError::Metrics(e.to_string()))?;
    }

    let shutdown = Shutdown::new();
    let server = Server::bind(&config, handler)
        .await?
        .with_shutdown(shutdown.clone());

    tracing::info!(
        address = %server.local_addr(),
        max_concurrent = config.pool.max_concurrent,
        queue_depth = config.pool.queue_depth,
        framing = ?config.limits.framing,
        "Server started"
    );

    let signals = spawn_signal_handler(shutdown);
    let stats = server.run().await;
    signals.abort();

    Ok(stats)
}
