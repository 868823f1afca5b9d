//! Metrics collection and exposition.
//!
//! # Metrics
//! - `app_listen_total` (counter): listen attempts by outcome
//! - `app_active_connections` (gauge): currently open connections
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Outcome label for `app_listen_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    Bound,
    Rejected,
    Failed,
}

impl ListenOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ListenOutcome::Bound => "bound",
            ListenOutcome::Rejected => "rejected",
            ListenOutcome::Failed => "failed",
        }
    }
}

pub fn record_listen(outcome: ListenOutcome) {
    metrics::counter!("app_listen_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("app_active_connections").set(count as f64);
}
