//! Telemetry error types.

use thiserror::Error;

/// Errors surfaced by the telemetry core to its callers.
///
/// Export failures are not part of this type: they stay inside the batch
/// processors and never reach code that emits telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Malformed resource or exporter configuration.
    #[error("invalid telemetry configuration: {0}")]
    Config(String),

    /// Providers need a tokio runtime to spawn their pipelines on.
    #[error("telemetry must be initialized from within a tokio runtime")]
    NoRuntime,

    /// `initialize` was called on a context that is already active or shut down.
    #[error("telemetry providers are already initialized")]
    AlreadyInitialized,

    /// Providers were requested before `initialize`.
    #[error("telemetry providers are not initialized")]
    NotInitialized,

    /// Providers were requested after `shutdown`.
    #[error("telemetry providers have been shut down")]
    ShutDown,

    /// `shutdown` was called twice.
    #[error("telemetry providers are already shut down")]
    AlreadyShutDown,

    /// Instrument registry configured a second time.
    #[error("metric instruments are already configured")]
    AlreadyConfigured,

    /// Instrument used before the registry was configured.
    #[error("metric instruments are not configured yet")]
    NotConfigured,

    /// A gauge observation that cannot be represented.
    #[error("invalid observation value: {0}")]
    InvalidObservation(f64),
}

/// Errors produced while delivering a batch to a remote collector.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Transport-level failure (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector rejected batch with status {0}")]
    Status(u16),

    /// Exporter-specific failure.
    #[error("export failed: {0}")]
    Other(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
