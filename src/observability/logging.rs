//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber
//! - Attach the log pipeline bridge when telemetry is active
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - Console level from `RUST_LOG`, falling back to config
//! - Console and bridge carry independent per-layer filters

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::telemetry::LogBridgeLayer;

/// Console filter: `RUST_LOG` if set, else the configured level with the
/// HTTP client stack quieted.
pub fn console_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,h2=warn,tower=warn",
            config.level
        ))
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(
    config: &LoggingConfig,
    bridge: Option<LogBridgeLayer>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let console = match config.format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    }
    .with_filter(console_filter(config));

    let bridge = bridge.map(|layer| {
        let targets = layer.targets();
        layer.with_filter(targets)
    });

    tracing_subscriber::registry()
        .with(console)
        .with(bridge)
        .try_init()
}
