//! Provider lifecycle.
//!
//! # Data Flow
//! ```text
//! Telemetry::initialize(resource, exporter config)
//!     → one exporter + batch processor per signal
//!     → TracerProvider / MeterProvider / LoggerProvider (Active)
//!     → MeterProvider starts its collection cycle
//!
//! Telemetry::shutdown()
//!     → stop collection, final collect
//!     → drain all three pipelines in parallel, each bounded by shutdown_timeout
//! ```
//!
//! # Design Decisions
//! - One explicit context object instead of process globals; it is passed
//!   by reference to whatever emits telemetry
//! - Lifecycle is `Uninitialized → Active → ShutDown`, one-directional;
//!   re-entry is a typed error, not a silent no-op
//! - Unreachable collectors are not an initialization failure

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use url::Url;

use crate::config::ExporterConfig;
use crate::telemetry::error::{TelemetryError, TelemetryResult};
use crate::telemetry::exporter::{Exporter, HttpExporter, Signal};
use crate::telemetry::instrument::{InstrumentStore, Meter};
use crate::telemetry::processor::{BatchConfig, BatchProcessor, ProcessorStats};
use crate::telemetry::record::{now_unix_nanos, Attributes, LogRecord, MetricData, SpanData, SpanStatus};
use crate::telemetry::resource::Resource;

const STATE_UNINITIALIZED: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_ACTIVE: u8 = 2;
const STATE_SHUT_DOWN: u8 = 3;

/// Lifecycle state of a [`Telemetry`] context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    ShutDown,
}

/// Exporters for the three pipelines.
pub struct ExporterSet {
    pub traces: Arc<dyn Exporter<SpanData>>,
    pub metrics: Arc<dyn Exporter<MetricData>>,
    pub logs: Arc<dyn Exporter<LogRecord>>,
}

impl ExporterSet {
    /// HTTP exporters pointed at `endpoint`.
    pub fn http(endpoint: &Url, resource: Arc<Resource>, timeout: Duration) -> TelemetryResult<Self> {
        Ok(Self {
            traces: Arc::new(HttpExporter::new(endpoint, Signal::Traces, resource.clone(), timeout)?),
            metrics: Arc::new(HttpExporter::new(endpoint, Signal::Metrics, resource.clone(), timeout)?),
            logs: Arc::new(HttpExporter::new(endpoint, Signal::Logs, resource, timeout)?),
        })
    }
}

/// The three live providers.
pub struct Providers {
    pub tracer: TracerProvider,
    pub meter: MeterProvider,
    pub logger: LoggerProvider,
    resource: Arc<Resource>,
    shutdown_timeout: Duration,
}

impl Providers {
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }
}

/// Lifecycle-managed owner of the telemetry providers.
pub struct Telemetry {
    state: AtomicU8,
    providers: OnceLock<Providers>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_UNINITIALIZED),
            providers: OnceLock::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => LifecycleState::Active,
            STATE_SHUT_DOWN => LifecycleState::ShutDown,
            _ => LifecycleState::Uninitialized,
        }
    }

    /// Build the HTTP pipelines for `config` and activate the providers.
    pub fn initialize(&self, resource: Resource, config: &ExporterConfig) -> TelemetryResult<&Providers> {
        let endpoint = config.endpoint_url().map_err(TelemetryError::Config)?;
        let resource = Arc::new(resource);
        let exporters = ExporterSet::http(&endpoint, resource.clone(), config.timeout())?;
        self.activate(resource, config, exporters)
    }

    /// Activate the providers with caller-supplied exporters.
    pub fn initialize_with(
        &self,
        resource: Resource,
        config: &ExporterConfig,
        exporters: ExporterSet,
    ) -> TelemetryResult<&Providers> {
        config.endpoint_url().map_err(TelemetryError::Config)?;
        self.activate(Arc::new(resource), config, exporters)
    }

    fn activate(
        &self,
        resource: Arc<Resource>,
        config: &ExporterConfig,
        exporters: ExporterSet,
    ) -> TelemetryResult<&Providers> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TelemetryError::NoRuntime);
        }
        config.check_limits().map_err(TelemetryError::Config)?;

        self.state
            .compare_exchange(
                STATE_UNINITIALIZED,
                STATE_INITIALIZING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| TelemetryError::AlreadyInitialized)?;

        let batch = config.batch_config();
        let providers = Providers {
            tracer: TracerProvider::new(resource.clone(), exporters.traces, batch.clone()),
            meter: MeterProvider::new(
                resource.clone(),
                exporters.metrics,
                batch.clone(),
                config.metric_interval(),
            ),
            logger: LoggerProvider::new(resource.clone(), exporters.logs, batch),
            resource,
            shutdown_timeout: config.shutdown_timeout(),
        };

        let providers = self.providers.get_or_init(|| providers);
        self.state.store(STATE_ACTIVE, Ordering::Release);
        Ok(providers)
    }

    /// The active providers.
    pub fn providers(&self) -> TelemetryResult<&Providers> {
        match self.state.load(Ordering::Acquire) {
            STATE_ACTIVE => self.providers.get().ok_or(TelemetryError::NotInitialized),
            STATE_SHUT_DOWN => Err(TelemetryError::ShutDown),
            _ => Err(TelemetryError::NotInitialized),
        }
    }

    /// Flush and stop every pipeline.
    pub async fn shutdown(&self) -> TelemetryResult<()> {
        match self.state.compare_exchange(
            STATE_ACTIVE,
            STATE_SHUT_DOWN,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_SHUT_DOWN) => return Err(TelemetryError::AlreadyShutDown),
            Err(_) => return Err(TelemetryError::NotInitialized),
        }

        let providers = self.providers.get().ok_or(TelemetryError::NotInitialized)?;
        let timeout = providers.shutdown_timeout;

        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Shutting down telemetry");

        let (traces, metrics, logs) = tokio::join!(
            providers.tracer.shutdown(timeout),
            providers.meter.shutdown(timeout),
            providers.logger.shutdown(timeout),
        );
        for result in [traces, metrics, logs] {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Pipeline shutdown reported an error");
            }
        }
        Ok(())
    }
}

struct TracerProviderInner {
    resource: Arc<Resource>,
    processor: BatchProcessor<SpanData>,
}

/// Owner of the trace pipeline.
#[derive(Clone)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl TracerProvider {
    fn new(resource: Arc<Resource>, exporter: Arc<dyn Exporter<SpanData>>, batch: BatchConfig) -> Self {
        Self {
            inner: Arc::new(TracerProviderInner {
                resource,
                processor: BatchProcessor::spawn(Signal::Traces, exporter, batch),
            }),
        }
    }

    pub fn tracer(&self, scope: impl Into<String>) -> Tracer {
        Tracer {
            scope: scope.into(),
            provider: self.clone(),
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.inner.resource
    }

    pub async fn force_flush(&self) -> TelemetryResult<()> {
        self.inner.processor.force_flush().await
    }

    pub fn stats(&self) -> ProcessorStats {
        self.inner.processor.stats()
    }

    async fn shutdown(&self, timeout: Duration) -> TelemetryResult<()> {
        self.inner.processor.shutdown(timeout).await
    }
}

/// Starts spans for one instrumentation scope.
#[derive(Clone)]
pub struct Tracer {
    scope: String,
    provider: TracerProvider,
}

impl Tracer {
    pub fn start(&self, name: impl Into<String>) -> ActiveSpan {
        let mut attributes = Attributes::new();
        attributes.insert("otel.scope.name".to_string(), self.scope.clone());

        ActiveSpan {
            data: Some(SpanData {
                trace_id: format!("{:032x}", rand::random::<u128>()),
                span_id: format!("{:016x}", rand::random::<u64>()),
                name: name.into(),
                start_unix_nanos: now_unix_nanos(),
                end_unix_nanos: 0,
                attributes,
                status: SpanStatus::Unset,
            }),
            provider: self.provider.clone(),
        }
    }
}

/// A span in progress. Ending or dropping it enqueues the finished span.
pub struct ActiveSpan {
    data: Option<SpanData>,
    provider: TracerProvider,
}

impl ActiveSpan {
    pub fn trace_id(&self) -> &str {
        self.data.as_ref().map(|d| d.trace_id.as_str()).unwrap_or_default()
    }

    pub fn span_id(&self) -> &str {
        self.data.as_ref().map(|d| d.span_id.as_str()).unwrap_or_default()
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.insert(key.into(), value.into());
        }
    }

    pub fn set_status(&mut self, status: SpanStatus) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
        }
    }

    pub fn end(self) {}
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.end_unix_nanos = now_unix_nanos();
            self.provider.inner.processor.enqueue(data);
        }
    }
}

struct MeterProviderInner {
    resource: Arc<Resource>,
    store: Arc<InstrumentStore>,
    processor: Arc<BatchProcessor<MetricData>>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the metric pipeline and its collection cycle.
#[derive(Clone)]
pub struct MeterProvider {
    inner: Arc<MeterProviderInner>,
}

impl MeterProvider {
    fn new(
        resource: Arc<Resource>,
        exporter: Arc<dyn Exporter<MetricData>>,
        batch: BatchConfig,
        interval: Duration,
    ) -> Self {
        let store = Arc::new(InstrumentStore::default());
        let processor = Arc::new(BatchProcessor::spawn(Signal::Metrics, exporter, batch));
        let collector = tokio::spawn(run_collection(store.clone(), processor.clone(), interval));

        Self {
            inner: Arc::new(MeterProviderInner {
                resource,
                store,
                processor,
                collector: Mutex::new(Some(collector)),
            }),
        }
    }

    pub fn meter(&self, scope: impl Into<String>) -> Meter {
        Meter::new(scope, self.inner.store.clone())
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.inner.resource
    }

    /// Names of every registered instrument.
    pub fn instrument_names(&self) -> Vec<String> {
        self.inner.store.names()
    }

    /// Run one collection cycle now and hand the result to the pipeline.
    pub fn collect(&self) -> usize {
        collect_into(&self.inner.store, &self.inner.processor)
    }

    /// Collect, then export everything queued.
    pub async fn force_flush(&self) -> TelemetryResult<()> {
        self.collect();
        self.inner.processor.force_flush().await
    }

    pub fn stats(&self) -> ProcessorStats {
        self.inner.processor.stats()
    }

    async fn shutdown(&self, timeout: Duration) -> TelemetryResult<()> {
        let collector = self
            .inner
            .collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(collector) = collector {
            collector.abort();
        }
        self.collect();
        self.inner.processor.shutdown(timeout).await
    }
}

fn collect_into(store: &InstrumentStore, processor: &BatchProcessor<MetricData>) -> usize {
    let collected = store.collect();
    let count = collected.len();
    for metric in collected {
        processor.enqueue(metric);
    }
    count
}

/// Periodic collection cycle: sample every instrument, then export.
async fn run_collection(
    store: Arc<InstrumentStore>,
    processor: Arc<BatchProcessor<MetricData>>,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let count = collect_into(&store, &processor);
        tracing::debug!(instruments = count, "Metric collection cycle");
        if processor.force_flush().await.is_err() {
            break;
        }
    }
}

struct LoggerProviderInner {
    resource: Arc<Resource>,
    processor: BatchProcessor<LogRecord>,
}

/// Owner of the log pipeline.
#[derive(Clone)]
pub struct LoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

impl LoggerProvider {
    fn new(resource: Arc<Resource>, exporter: Arc<dyn Exporter<LogRecord>>, batch: BatchConfig) -> Self {
        Self {
            inner: Arc::new(LoggerProviderInner {
                resource,
                processor: BatchProcessor::spawn(Signal::Logs, exporter, batch),
            }),
        }
    }

    /// Hand a record to the log pipeline. Never blocks.
    pub fn emit(&self, record: LogRecord) {
        self.inner.processor.enqueue(record);
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.inner.resource
    }

    pub async fn force_flush(&self) -> TelemetryResult<()> {
        self.inner.processor.force_flush().await
    }

    pub fn stats(&self) -> ProcessorStats {
        self.inner.processor.stats()
    }

    async fn shutdown(&self, timeout: Duration) -> TelemetryResult<()> {
        self.inner.processor.shutdown(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::exporter::InMemoryExporter;

    fn exporters() -> (
        ExporterSet,
        InMemoryExporter<SpanData>,
        InMemoryExporter<MetricData>,
        InMemoryExporter<LogRecord>,
    ) {
        let traces = InMemoryExporter::new();
        let metrics = InMemoryExporter::new();
        let logs = InMemoryExporter::new();
        let set = ExporterSet {
            traces: Arc::new(traces.clone()),
            metrics: Arc::new(metrics.clone()),
            logs: Arc::new(logs.clone()),
        };
        (set, traces, metrics, logs)
    }

    #[test]
    fn test_initialize_requires_runtime() {
        let telemetry = Telemetry::new();
        let (set, ..) = exporters();
        let result = telemetry.initialize_with(Resource::builder().build(), &ExporterConfig::default(), set);
        assert!(matches!(result, Err(TelemetryError::NoRuntime)));
        assert_eq!(telemetry.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let telemetry = Telemetry::new();
        assert!(matches!(telemetry.providers(), Err(TelemetryError::NotInitialized)));
        assert!(matches!(telemetry.shutdown().await, Err(TelemetryError::NotInitialized)));

        let (set, ..) = exporters();
        telemetry
            .initialize_with(Resource::builder().build(), &ExporterConfig::default(), set)
            .unwrap();
        assert_eq!(telemetry.state(), LifecycleState::Active);
        assert!(telemetry.providers().is_ok());

        let (set, ..) = exporters();
        assert!(matches!(
            telemetry.initialize_with(Resource::builder().build(), &ExporterConfig::default(), set),
            Err(TelemetryError::AlreadyInitialized)
        ));

        telemetry.shutdown().await.unwrap();
        assert_eq!(telemetry.state(), LifecycleState::ShutDown);
        assert!(matches!(telemetry.providers(), Err(TelemetryError::ShutDown)));
        assert!(matches!(telemetry.shutdown().await, Err(TelemetryError::AlreadyShutDown)));
    }

    #[tokio::test]
    async fn test_malformed_endpoint_is_config_error() {
        let telemetry = Telemetry::new();
        let config = ExporterConfig {
            endpoint: "not a url".to_string(),
            ..ExporterConfig::default()
        };
        assert!(matches!(
            telemetry.initialize(Resource::builder().build(), &config),
            Err(TelemetryError::Config(_))
        ));
        assert_eq!(telemetry.state(), LifecycleState::Uninitialized);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_not_fatal() {
        let telemetry = Telemetry::new();
        let config = ExporterConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            shutdown_timeout_ms: 200,
            ..ExporterConfig::default()
        };
        let providers = telemetry.initialize(Resource::builder().build(), &config).unwrap();
        providers.logger.emit(LogRecord::new(crate::telemetry::record::Severity::Info, "hello"));
        telemetry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_span_is_exported_on_drop() {
        let telemetry = Telemetry::new();
        let (set, traces, ..) = exporters();
        let providers = telemetry
            .initialize_with(Resource::builder().build(), &ExporterConfig::default(), set)
            .unwrap();

        let tracer = providers.tracer.tracer("test");
        let mut span = tracer.start("GET /items");
        span.set_attribute("http.method", "GET");
        span.set_status(SpanStatus::Ok);
        let trace_id = span.trace_id().to_string();
        assert_eq!(trace_id.len(), 32);
        assert_eq!(span.span_id().len(), 16);
        span.end();

        providers.tracer.force_flush().await.unwrap();
        let spans = traces.records();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].trace_id, trace_id);
        assert_eq!(spans[0].status, SpanStatus::Ok);
        assert!(spans[0].end_unix_nanos >= spans[0].start_unix_nanos);
    }
}
