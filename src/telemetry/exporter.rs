//! Exporters: the remote end of each pipeline.
//!
//! # Responsibilities
//! - Deliver one batch of records per call
//! - Report delivery failures to the batch processor (never to emitters)
//!
//! # Design Decisions
//! - Object-safe trait with boxed futures so processors hold `Arc<dyn Exporter<T>>`
//! - The HTTP exporter pushes one JSON envelope per batch, tagged with the resource
//! - An in-memory exporter doubles as a debug sink and a test double

use futures_util::future::BoxFuture;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::telemetry::error::{ExportError, TelemetryError, TelemetryResult};
use crate::telemetry::resource::Resource;

/// Signal kind handled by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }

    /// Collector path for this signal, relative to the endpoint root.
    pub fn path(&self) -> &'static str {
        match self {
            Signal::Traces => "v1/traces",
            Signal::Metrics => "v1/metrics",
            Signal::Logs => "v1/logs",
        }
    }
}

/// Delivers batches of `T` to some destination.
pub trait Exporter<T>: Send + Sync + 'static {
    /// Deliver one batch. Records are in enqueue order.
    fn export<'a>(&'a self, batch: &'a [T]) -> BoxFuture<'a, Result<(), ExportError>>;

    /// Release exporter resources. Called once, after the final export.
    fn shutdown(&self) {}
}

/// Build the per-signal URL from the configured endpoint root.
pub fn signal_url(endpoint: &Url, signal: Signal) -> Url {
    let path = endpoint.path().trim_end_matches('/');
    if path.ends_with(signal.path()) {
        return endpoint.clone();
    }

    let mut url = endpoint.clone();
    url.set_path(&format!("{}/{}", path, signal.path()));
    url
}

/// Pushes JSON batches to an HTTP collector.
pub struct HttpExporter<T> {
    client: reqwest::Client,
    url: Url,
    signal: Signal,
    resource: Arc<Resource>,
    _records: PhantomData<fn(T)>,
}

impl<T> HttpExporter<T> {
    pub fn new(
        endpoint: &Url,
        signal: Signal,
        resource: Arc<Resource>,
        timeout: Duration,
    ) -> TelemetryResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: signal_url(endpoint, signal),
            signal,
            resource,
            _records: PhantomData,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl<T> Exporter<T> for HttpExporter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    fn export<'a>(&'a self, batch: &'a [T]) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(async move {
            let mut envelope = serde_json::Map::new();
            envelope.insert(
                "resource".to_string(),
                serde_json::to_value(&*self.resource).map_err(|e| ExportError::Other(e.to_string()))?,
            );
            envelope.insert(
                self.signal.as_str().to_string(),
                serde_json::to_value(batch).map_err(|e| ExportError::Other(e.to_string()))?,
            );

            let response = self
                .client
                .post(self.url.clone())
                .json(&envelope)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ExportError::Status(status.as_u16()));
            }
            Ok(())
        })
    }
}

struct InMemoryState<T> {
    batches: Mutex<Vec<Vec<T>>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
    shut_down: AtomicBool,
}

/// Keeps every delivered batch in memory.
pub struct InMemoryExporter<T> {
    state: Arc<InMemoryState<T>>,
}

impl<T> Clone for InMemoryExporter<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for InMemoryExporter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InMemoryExporter<T> {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Each export takes `delay` before it is recorded.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            state: Arc::new(InMemoryState {
                batches: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(0),
                delay,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Fail the next `count` export attempts.
    pub fn fail_next(&self, count: usize) {
        self.state.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of export calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.shut_down.load(Ordering::SeqCst)
    }
}

impl<T: Clone> InMemoryExporter<T> {
    /// Delivered batches, in delivery order.
    pub fn batches(&self) -> Vec<Vec<T>> {
        self.state.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// All delivered records, flattened in delivery order.
    pub fn records(&self) -> Vec<T> {
        self.batches().into_iter().flatten().collect()
    }
}

impl<T> Exporter<T> for InMemoryExporter<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn export<'a>(&'a self, batch: &'a [T]) -> BoxFuture<'a, Result<(), ExportError>> {
        Box::pin(async move {
            self.state.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.state.delay.is_zero() {
                tokio::time::sleep(self.state.delay).await;
            }

            let failed = self
                .state
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failed {
                return Err(ExportError::Other("injected failure".to_string()));
            }

            self.state
                .batches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(batch.to_vec());
            Ok(())
        })
    }

    fn shutdown(&self) {
        self.state.shut_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_url_appends_path() {
        let endpoint = Url::parse("http://collector:4318").unwrap();
        assert_eq!(
            signal_url(&endpoint, Signal::Metrics).as_str(),
            "http://collector:4318/v1/metrics"
        );

        let endpoint = Url::parse("http://collector:4318/otlp/").unwrap();
        assert_eq!(
            signal_url(&endpoint, Signal::Logs).as_str(),
            "http://collector:4318/otlp/v1/logs"
        );
    }

    #[test]
    fn test_signal_url_keeps_explicit_path() {
        let endpoint = Url::parse("http://collector:4318/v1/traces").unwrap();
        assert_eq!(
            signal_url(&endpoint, Signal::Traces).as_str(),
            "http://collector:4318/v1/traces"
        );
    }

    #[tokio::test]
    async fn test_in_memory_failure_injection() {
        let exporter = InMemoryExporter::<u32>::new();
        exporter.fail_next(1);

        assert!(exporter.export(&[1, 2]).await.is_err());
        assert!(exporter.export(&[1, 2]).await.is_ok());
        assert_eq!(exporter.attempts(), 2);
        assert_eq!(exporter.batches(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_http_exporter_unreachable_is_error() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let endpoint = Url::parse("http://127.0.0.1:9").unwrap();
        let resource = Arc::new(Resource::builder().build());
        let exporter =
            HttpExporter::<u32>::new(&endpoint, Signal::Logs, resource, Duration::from_secs(1)).unwrap();
        assert!(exporter.export(&[1]).await.is_err());
    }
}
