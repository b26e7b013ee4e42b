//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Metric names as constants for consistency.
pub mod names {
    pub const ASSEMBLIES_TOTAL: &str = "memoir_assemblies_total";
    pub const ASSEMBLY_DURATION_SECONDS: &str = "memoir_assembly_duration_seconds";
    pub const INGEST_TOTAL: &str = "memoir_ingest_total";
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `port`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter on {}: {}", addr, e))
}

/// Record a finished assembly. `outcome` is `success` or an error kind.
pub fn record_assembly(outcome: &'static str, mode: &'static str, duration_secs: f64) {
    counter!(names::ASSEMBLIES_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::ASSEMBLY_DURATION_SECONDS, "mode" => mode).record(duration_secs);
}

/// Record a finished ingestion job.
pub fn record_ingest(outcome: &'static str) {
    counter!(names::INGEST_TOTAL, "outcome" => outcome).increment(1);
}
