//! Telemetry demo service.
//!
//! An HTTP service that exports traces, metrics and logs to a collector,
//! with a background generator that keeps the streams populated.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                   TELEMETRY DEMO                     │
//!                 │                                                      │
//!   Client ──────▶│  http::server ─▶ middleware ─▶ handlers              │
//!                 │        │             │  spans, request_count         │
//!                 │        │             ▼                               │
//!                 │        │      ┌──────────────┐   ┌───────────────┐   │
//!                 │        │      │  telemetry   │◀──│   workload    │   │
//!                 │        │      │  providers   │   │   generator   │   │
//!                 │        │      └──────┬───────┘   └───────────────┘   │
//!                 │        │             │ batch processors              │
//!                 │   tracing events ────┘ (bridge)                      │
//!                 └──────────────────────┬───────────────────────────────┘
//!                                        ▼
//!                         collector  /v1/traces /v1/metrics /v1/logs
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use telemetry_demo::config::loader::load_config;
use telemetry_demo::config::validation::validate_config;
use telemetry_demo::config::{ConfigError, ServiceConfig};
use telemetry_demo::lifecycle::{run_service, wait_for_signal, Shutdown};
use telemetry_demo::observability::{logging, metrics};
use telemetry_demo::telemetry::{LogBridgeLayer, LoggerProvider, Severity, Telemetry};

#[derive(Parser)]
#[command(name = "telemetry-demo")]
#[command(about = "HTTP service exporting traces, metrics and logs", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listener address, overrides config and APP_BIND_ADDRESS
    #[arg(long)]
    bind: Option<String>,

    /// Collector endpoint, overrides config and OTEL_EXPORTER_OTLP_ENDPOINT
    #[arg(long)]
    endpoint: Option<String>,

    /// Do not start the synthetic workload generator
    #[arg(long)]
    no_generator: bool,
}

fn load(cli: &Cli) -> Result<ServiceConfig, ConfigError> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        config.exporter.endpoint = endpoint.clone();
    }
    if cli.no_generator {
        config.generator.enabled = false;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Install the subscriber, with the bridge when enabled.
fn install_logging(
    config: &ServiceConfig,
    logger: &LoggerProvider,
) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = if config.logging.bridge_enabled {
        let min_severity: Severity = config.logging.bridge_level.parse()?;
        Some(LogBridgeLayer::new(logger.clone(), min_severity))
    } else {
        None
    };
    logging::init_logging(&config.logging, bridge)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    let resource = config.resource.build_resource()?;
    let telemetry = Telemetry::new();
    let providers = telemetry.initialize(resource, &config.exporter)?;

    if let Err(e) = install_logging(&config, &providers.logger) {
        let _ = telemetry.shutdown().await;
        return Err(e);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = providers.resource().service_name(),
        "telemetry-demo starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_signal().await;
            shutdown.trigger();
        }
    });

    run_service(&config, &telemetry, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
