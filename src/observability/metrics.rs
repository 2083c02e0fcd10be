//! Pipeline self-metrics and Prometheus exposition.
//!
//! # Metrics
//! - `telemetry_pipeline_exported_total` (counter): records delivered, by signal
//! - `telemetry_pipeline_dropped_total` (counter): records lost, by signal and reason
//! - `telemetry_pipeline_queue_depth` (gauge): records waiting after each batch is taken
//! - `http_requests_total` (counter): requests served, by route, method and status
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed recorder
//!   the calls are no-ops
//! - Exposed on a separate listener so scraping never touches the app router

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    tracing::info!(address = %addr, "Prometheus metrics exporter started");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!(
        "telemetry_pipeline_exported_total",
        "Records delivered to the collector"
    );
    metrics::describe_counter!(
        "telemetry_pipeline_dropped_total",
        "Records dropped before delivery"
    );
    metrics::describe_gauge!(
        "telemetry_pipeline_queue_depth",
        "Records waiting in the export queue"
    );
    metrics::describe_counter!("http_requests_total", "HTTP requests served");
}

/// Record one served request.
pub fn record_request(route: &str, method: &str, status: u16) {
    metrics::counter!(
        "http_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
