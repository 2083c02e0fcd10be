//! Startup orchestration.
//!
//! # Responsibilities
//! - Configure the metric instruments against the active providers
//! - Bind the listener, then start background tasks and serve traffic
//! - Drain the telemetry pipelines however serving ends
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds before the generator starts, so a bind failure
//!   leaves no task behind
//! - Telemetry drains on the error path too, so startup logs are not lost

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::http::server::TRACER_SCOPE;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::telemetry::{InstrumentRegistry, Telemetry, TelemetryError};
use crate::workload::{GeneratorConfig, WorkloadGenerator};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Serve until `shutdown` fires, then drain telemetry.
///
/// The drain runs whether serving succeeded or not. A serving error takes
/// precedence over a drain error.
pub async fn run_service(
    config: &ServiceConfig,
    telemetry: &Telemetry,
    shutdown: Arc<Shutdown>,
) -> Result<(), StartupError> {
    let served = serve(config, telemetry, &shutdown).await;
    let drained = telemetry.shutdown().await;
    served?;
    drained?;
    Ok(())
}

async fn serve(
    config: &ServiceConfig,
    telemetry: &Telemetry,
    shutdown: &Arc<Shutdown>,
) -> Result<(), StartupError> {
    let providers = telemetry.providers()?;
    tracing::info!(
        endpoint = %config.exporter.endpoint,
        service = providers.resource().service_name(),
        metric_interval_ms = config.exporter.metric_interval_ms,
        "Telemetry providers initialized"
    );

    let registry = Arc::new(InstrumentRegistry::new());
    registry.configure(&providers.meter)?;

    let address = &config.listener.bind_address;
    let listener = TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;
    if let Ok(local) = listener.local_addr() {
        tracing::info!(address = %local, "Listening for connections");
    }

    let generator = if config.generator.enabled {
        let generator = WorkloadGenerator::new(
            registry.clone(),
            GeneratorConfig::from(&config.generator),
        );
        Some(generator.start(shutdown))
    } else {
        tracing::info!("Workload generator disabled");
        None
    };

    let state = AppState {
        registry,
        tracer: providers.tracer.tracer(TRACER_SCOPE),
    };
    let served = HttpServer::new(state, &config.timeouts)
        .run(listener, shutdown.signalled())
        .await;

    // The server may also stop on its own error.
    shutdown.trigger();
    if let Some(generator) = generator {
        if let Err(e) = generator.await {
            tracing::error!(error = %e, "Workload generator task failed");
        }
    }

    served.map_err(StartupError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfig;
    use crate::telemetry::exporter::InMemoryExporter;
    use crate::telemetry::provider::{ExporterSet, LifecycleState};
    use crate::telemetry::record::{LogRecord, Severity};
    use crate::telemetry::resource::Resource;
    use crate::telemetry::LogBridgeLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Layer;

    fn telemetry_with_logs() -> (Telemetry, InMemoryExporter<LogRecord>) {
        let logs = InMemoryExporter::new();
        let set = ExporterSet {
            traces: Arc::new(InMemoryExporter::new()),
            metrics: Arc::new(InMemoryExporter::new()),
            logs: Arc::new(logs.clone()),
        };
        let config = ExporterConfig {
            scheduled_delay_ms: 60_000,
            ..ExporterConfig::default()
        };
        let telemetry = Telemetry::new();
        telemetry
            .initialize_with(Resource::builder().build(), &config, set)
            .unwrap();
        (telemetry, logs)
    }

    #[tokio::test]
    async fn test_bind_failure_still_drains_pipelines() {
        let (telemetry, logs) = telemetry_with_logs();
        let bridge = LogBridgeLayer::new(telemetry.providers().unwrap().logger.clone(), Severity::Info);
        let targets = bridge.targets();
        let _subscriber = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(bridge.with_filter(targets)),
        );

        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = ServiceConfig::default();
        config.listener.bind_address = taken.local_addr().unwrap().to_string();
        config.generator.enabled = false;

        let result = run_service(&config, &telemetry, Arc::new(Shutdown::new())).await;

        assert!(matches!(result, Err(StartupError::Bind { .. })));
        assert_eq!(telemetry.state(), LifecycleState::ShutDown);
        assert!(logs.is_shut_down());
        let bodies: Vec<String> = logs.records().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec!["Telemetry providers initialized".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_server_and_generator() {
        let (telemetry, _logs) = telemetry_with_logs();
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "127.0.0.1:0".to_string();
        config.generator.min_interval_ms = 10;
        config.generator.max_interval_ms = 20;

        let shutdown = Arc::new(Shutdown::new());
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.trigger();
        });

        run_service(&config, &telemetry, shutdown).await.unwrap();
        assert_eq!(telemetry.state(), LifecycleState::ShutDown);
    }
}
