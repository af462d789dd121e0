//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate signals into shutdown requests
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - First signal drains; a second one forces the remaining connections closed

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Forward termination signals to `shutdown` until a forced shutdown is requested.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = wait_for_signal().await {
                tracing::error!(error = %e, "Failed to install signal handler");
                return;
            }

            match shutdown.trigger() {
                1 => tracing::info!("Shutdown signal received, draining connections"),
                _ => {
                    tracing::warn!("Second shutdown signal received, forcing close");
                    return;
                }
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
