//! Metrics collection and exposition.
//!
//! # Metrics
//! - `oneshot_connections_accepted_total` (counter)
//! - `oneshot_connections_rejected_total` (counter): by reason
//! - `oneshot_accept_errors_total` (counter)
//! - `oneshot_requests_total` (counter): by outcome
//! - `oneshot_request_duration_seconds` (histogram): accept to close
//! - `oneshot_in_flight` (gauge): connections holding a slot
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_accepted() {
    counter!("oneshot_connections_accepted_total").increment(1);
}

pub fn record_rejected(reason: &'static str) {
    counter!("oneshot_connections_rejected_total", "reason" => reason).increment(1);
}

pub fn record_accept_error() {
    counter!("oneshot_accept_errors_total").increment(1);
}

pub fn record_request(outcome: &'static str, elapsed: Duration) {
    counter!("oneshot_requests_total", "outcome" => outcome).increment(1);
    histogram!("oneshot_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn set_in_flight(count: usize) {
    gauge!("oneshot_in_flight").set(count as f64);
}
