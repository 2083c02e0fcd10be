//! Telemetry subsystem: three export pipelines and their providers.
//!
//! # Data Flow
//! ```text
//! Tracer ──spans──▶ BatchProcessor<SpanData>   ──▶ Exporter (v1/traces)
//! Meter  ──collect─▶ BatchProcessor<MetricData> ──▶ Exporter (v1/metrics)
//! tracing events ──LogBridgeLayer──▶ LoggerProvider
//!                 ──▶ BatchProcessor<LogRecord> ──▶ Exporter (v1/logs)
//! ```
//!
//! # Design Decisions
//! - Every pipeline is independent: a slow or dead collector for one signal
//!   never stalls the others
//! - Emitters never block and never observe export failures
//! - Every record is attributed to one shared `Resource`

pub mod backoff;
pub mod bridge;
pub mod error;
pub mod exporter;
pub mod instrument;
pub mod processor;
pub mod provider;
pub mod record;
pub mod registry;
pub mod resource;

pub use bridge::LogBridgeLayer;
pub use error::{ExportError, TelemetryError, TelemetryResult};
pub use exporter::{Exporter, HttpExporter, InMemoryExporter, Signal};
pub use instrument::{Counter, Meter, ObservableGauge, Observation};
pub use processor::{BatchConfig, BatchProcessor, ProcessorStats};
pub use provider::{
    ActiveSpan, ExporterSet, LifecycleState, LoggerProvider, MeterProvider, Providers, Telemetry,
    Tracer, TracerProvider,
};
pub use record::{LogRecord, MetricData, MetricPoints, Severity, SpanData, SpanStatus};
pub use registry::{GaugeCell, InstrumentRegistry};
pub use resource::Resource;
