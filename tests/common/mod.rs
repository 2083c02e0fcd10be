//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use telemetry_demo::config::{ExporterConfig, TimeoutConfig};
use telemetry_demo::http::server::TRACER_SCOPE;
use telemetry_demo::http::{AppState, HttpServer};
use telemetry_demo::lifecycle::Shutdown;
use telemetry_demo::telemetry::{
    ExporterSet, InMemoryExporter, InstrumentRegistry, LogRecord, MetricData, MetricPoints,
    Resource, SpanData, Telemetry,
};

/// In-memory sinks behind each pipeline.
#[derive(Clone, Default)]
pub struct Sinks {
    pub traces: InMemoryExporter<SpanData>,
    pub metrics: InMemoryExporter<MetricData>,
    pub logs: InMemoryExporter<LogRecord>,
}

impl Sinks {
    pub fn with_log_delay(delay: Duration) -> Self {
        Self {
            logs: InMemoryExporter::with_delay(delay),
            ..Self::default()
        }
    }

    pub fn exporter_set(&self) -> ExporterSet {
        ExporterSet {
            traces: Arc::new(self.traces.clone()),
            metrics: Arc::new(self.metrics.clone()),
            logs: Arc::new(self.logs.clone()),
        }
    }
}

/// Exporter settings with a slow timer so tests drive exports explicitly.
pub fn test_exporter_config() -> ExporterConfig {
    ExporterConfig {
        scheduled_delay_ms: 60_000,
        metric_interval_ms: 60_000,
        shutdown_timeout_ms: 5_000,
        ..ExporterConfig::default()
    }
}

pub fn start_telemetry(config: &ExporterConfig, sinks: &Sinks) -> Telemetry {
    let telemetry = Telemetry::new();
    telemetry
        .initialize_with(
            Resource::builder().with_service_name("integration-test").build(),
            config,
            sinks.exporter_set(),
        )
        .unwrap();
    telemetry
}

/// Cumulative value of the last exported `name` sum point with `labels`.
pub fn last_sum(metrics: &[MetricData], name: &str, labels: &[(&str, &str)]) -> Option<u64> {
    metrics
        .iter()
        .rev()
        .filter(|m| m.name == name)
        .find_map(|m| match &m.data {
            MetricPoints::Sum { points, .. } => points
                .iter()
                .find(|p| {
                    p.attributes.len() == labels.len()
                        && labels
                            .iter()
                            .all(|(k, v)| p.attributes.get(*k).map(String::as_str) == Some(*v))
                })
                .map(|p| p.value),
            MetricPoints::Gauge { .. } => None,
        })
}

/// A running server backed by in-memory telemetry.
pub struct TestApp {
    pub addr: SocketAddr,
    pub telemetry: Telemetry,
    pub registry: Arc<InstrumentRegistry>,
    pub sinks: Sinks,
    pub shutdown: Shutdown,
    pub server: JoinHandle<Result<(), std::io::Error>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_app() -> TestApp {
    let sinks = Sinks::default();
    let telemetry = start_telemetry(&test_exporter_config(), &sinks);
    let providers = telemetry.providers().unwrap();

    let registry = Arc::new(InstrumentRegistry::new());
    registry.configure(&providers.meter).unwrap();

    let state = AppState {
        registry: registry.clone(),
        tracer: providers.tracer.tracer(TRACER_SCOPE),
    };
    let server = HttpServer::new(state, &TimeoutConfig::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let stop = shutdown.signalled();
    let server = tokio::spawn(server.run(listener, stop));

    TestApp {
        addr,
        telemetry,
        registry,
        sinks,
        shutdown,
        server,
    }
}
