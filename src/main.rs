//! oneshot-server
//!
//! Accepts TCP connections, reads one request from each, answers with a fixed
//! response and closes the connection.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                   ONESHOT SERVER                      │
//!                  │                                                       │
//!   Client ────────┼─▶ ┌──────────┐   ┌────────────┐   ┌──────────────┐   │
//!                  │   │   net    │──▶│  dispatch  │──▶│    worker    │   │
//!                  │   │ listener │   │ pool/queue │   │ read→handle  │   │
//!                  │   └──────────┘   └─────┬──────┘   │ →write→close │   │
//!                  │                        │ reject   └──────┬───────┘   │
//!   Client ◀───────┼────────────────────────┴─────────────────┘           │
//!                  │                                                       │
//!                  │   lifecycle: Starting → Running → Draining → Stopped  │
//!                  │   config · observability · resilience                 │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use oneshot_server::config::{load_config, validate_config, ConfigError, ServerConfig};
use oneshot_server::lifecycle::startup;
use oneshot_server::lifecycle::ServerError;
use oneshot_server::observability::logging::init_logging;
use oneshot_server::FixedResponse;

#[derive(Parser)]
#[command(name = "oneshot-server")]
#[command(about = "Answers one request per TCP connection with a fixed response", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, e.g. 0.0.0.0:8080.
    #[arg(short, long)]
    bind: Option<String>,

    /// Maximum connections processed at once.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Connections allowed to wait for a free slot (0 rejects immediately).
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.pool.max_concurrent = max_concurrent;
        }
        if let Some(queue_depth) = self.queue_depth {
            config.pool.queue_depth = queue_depth;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

fn load(cli: &Cli) -> Result<ServerConfig, ServerError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);

    // Flags may override file values, so validate after merging.
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("oneshot-server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("oneshot-server: failed to initialise logging: {e}");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_concurrent = config.pool.max_concurrent,
        queue_depth = config.pool.queue_depth,
        connection_timeout_ms = config.timeouts.connection_ms,
        "Configuration loaded"
    );

    let handler = match FixedResponse::from_config(&config.response) {
        Ok(handler) => handler,
        Err(e) => {
            tracing::error!(error = %e, "Invalid response configuration");
            return ExitCode::FAILURE;
        }
    };

    match startup::run(config, handler).await {
        Ok(_) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed to start");
            ExitCode::FAILURE
        }
    }
}
