//! Batch processor: the buffering half of an export pipeline.
//!
//! # Data Flow
//! ```text
//! emitters ──enqueue()──▶ bounded queue ──worker──▶ Exporter
//!                          (drop oldest)     │
//!                                            ├─ timer tick: export everything queued
//!                                            ├─ queue ≥ batch size: export full batches
//!                                            └─ flush / shutdown: drain with inline retries
//! ```
//!
//! # Invariants
//! - Records leave the queue in enqueue order; a failed batch is retried
//!   before any newer record is exported.
//! - One worker per processor, so at most one export is in flight.
//! - Delivery failures never reach `enqueue` callers; they end in a retry or
//!   a counted drop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::telemetry::backoff::retry_delay;
use crate::telemetry::error::{TelemetryError, TelemetryResult};
use crate::telemetry::exporter::{Exporter, Signal};

/// Tuning knobs for one batch processor.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Queue capacity; the oldest record is evicted beyond this.
    pub max_queue_size: usize,
    /// Records per export call, and the size that triggers an early export.
    pub max_export_batch_size: usize,
    /// Period of the export timer.
    pub scheduled_delay: Duration,
    /// Retries granted to a failed batch before it is dropped.
    pub max_export_retries: u32,
    /// Backoff base for retries during a drain.
    pub retry_base_delay: Duration,
    /// Backoff cap for retries during a drain.
    pub retry_max_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay: Duration::from_secs(5),
            max_export_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
        }
    }
}

/// Snapshot of a processor's internal counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub enqueued: u64,
    pub exported: u64,
    pub dropped: u64,
    pub queued: usize,
}

enum Control {
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Shared<T> {
    signal: Signal,
    queue: Mutex<VecDeque<T>>,
    wake: Notify,
    max_queue_size: usize,
    max_batch: usize,
    stopped: AtomicBool,
    enqueued: AtomicU64,
    exported: AtomicU64,
    dropped: AtomicU64,
    /// Records refused after the stop flag; never part of `enqueued`.
    rejected: AtomicU64,
}

impl<T> Shared<T> {
    fn queue(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_batch(&self) -> Vec<T> {
        let mut queue = self.queue();
        let count = queue.len().min(self.max_batch);
        let batch: Vec<T> = queue.drain(..count).collect();
        metrics::gauge!("telemetry_pipeline_queue_depth", "signal" => self.signal.as_str())
            .set(queue.len() as f64);
        batch
    }

    fn record_exported(&self, count: usize) {
        self.exported.fetch_add(count as u64, Ordering::Relaxed);
        metrics::counter!("telemetry_pipeline_exported_total", "signal" => self.signal.as_str())
            .increment(count as u64);
    }

    fn record_dropped(&self, count: u64, reason: &'static str) {
        if count == 0 {
            return;
        }
        self.dropped.fetch_add(count, Ordering::Relaxed);
        metrics::counter!(
            "telemetry_pipeline_dropped_total",
            "signal" => self.signal.as_str(),
            "reason" => reason
        )
        .increment(count);
    }
}

/// Buffers records for one exporter and runs its export cycle.
pub struct BatchProcessor<T> {
    shared: Arc<Shared<T>>,
    control: mpsc::UnboundedSender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> BatchProcessor<T> {
    /// Start the processor's worker on the current tokio runtime.
    pub fn spawn(signal: Signal, exporter: Arc<dyn Exporter<T>>, config: BatchConfig) -> Self {
        let shared = Arc::new(Shared {
            signal,
            queue: Mutex::new(VecDeque::with_capacity(config.max_queue_size.min(4096))),
            wake: Notify::new(),
            max_queue_size: config.max_queue_size.max(1),
            max_batch: config.max_export_batch_size.max(1),
            stopped: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let (control, control_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            shared: shared.clone(),
            exporter,
            config,
            pending: None,
        };
        let handle = tokio::spawn(worker.run(control_rx));

        tracing::debug!(signal = signal.as_str(), "Batch processor started");

        Self {
            shared,
            control,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a record for export. Never blocks and never fails.
    pub fn enqueue(&self, record: T) {
        let shared = &self.shared;
        if shared.stopped.load(Ordering::Acquire) {
            shared.rejected.fetch_add(1, Ordering::Relaxed);
            shared.record_dropped(1, "shutdown");
            return;
        }

        let (len, evicted) = {
            let mut queue = shared.queue();
            let evicted = if queue.len() >= shared.max_queue_size {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(record);
            (queue.len(), evicted)
        };

        shared.enqueued.fetch_add(1, Ordering::Relaxed);
        if evicted {
            shared.record_dropped(1, "queue_full");
        }
        if len >= shared.max_batch {
            shared.wake.notify_one();
        }
    }

    /// Export everything queued right now and wait for it.
    pub async fn force_flush(&self) -> TelemetryResult<()> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(TelemetryError::ShutDown);
        }

        let (tx, rx) = oneshot::channel();
        if self.control.send(Control::Flush(tx)).is_err() {
            return Err(TelemetryError::ShutDown);
        }
        let _ = rx.await;
        Ok(())
    }

    /// Flush then stop, waiting at most `timeout`.
    ///
    /// Records still undelivered when the timeout expires are dropped and
    /// counted; the caller never sees an export error.
    pub async fn shutdown(&self, timeout: Duration) -> TelemetryResult<()> {
        let shared = &self.shared;
        if shared.stopped.swap(true, Ordering::AcqRel) {
            return Err(TelemetryError::AlreadyShutDown);
        }

        let (tx, rx) = oneshot::channel();
        let _ = self.control.send(Control::Shutdown(tx));
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match time::timeout(timeout, rx).await {
            Ok(_) => {
                if let Some(handle) = handle {
                    let _ = handle.await;
                }
                // Records that raced past the stop flag.
                let stragglers = shared.queue().drain(..).count() as u64;
                shared.record_dropped(stragglers, "shutdown");
            }
            Err(_) => {
                if let Some(handle) = handle {
                    handle.abort();
                    let _ = handle.await;
                }
                shared.queue().clear();
                // Everything accepted and not yet settled, including the
                // aborted in-flight or held batch.
                let rejected = shared.rejected.load(Ordering::Relaxed);
                let settled = shared.exported.load(Ordering::Relaxed)
                    + shared.dropped.load(Ordering::Relaxed).saturating_sub(rejected);
                let lost = shared.enqueued.load(Ordering::Relaxed).saturating_sub(settled);
                shared.record_dropped(lost, "shutdown_timeout");
                tracing::warn!(
                    signal = shared.signal.as_str(),
                    lost,
                    timeout_ms = timeout.as_millis() as u64,
                    "Shutdown timed out before pipeline drained"
                );
            }
        }

        tracing::debug!(signal = shared.signal.as_str(), "Batch processor stopped");
        Ok(())
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            enqueued: self.shared.enqueued.load(Ordering::Relaxed),
            exported: self.shared.exported.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            queued: self.shared.queue().len(),
        }
    }

    pub fn signal(&self) -> Signal {
        self.shared.signal
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

/// A batch that failed at least once and waits for its next attempt.
struct PendingBatch<T> {
    records: Vec<T>,
    failures: u32,
}

struct Worker<T> {
    shared: Arc<Shared<T>>,
    exporter: Arc<dyn Exporter<T>>,
    config: BatchConfig,
    pending: Option<PendingBatch<T>>,
}

impl<T: Send + Sync + 'static> Worker<T> {
    async fn run(mut self, mut control: mpsc::UnboundedReceiver<Control>) {
        let shared = self.shared.clone();
        let mut ticker = time::interval(self.config.scheduled_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.export_cycle().await;
                }
                _ = shared.wake.notified() => {
                    self.export_full_batches().await;
                }
                message = control.recv() => match message {
                    Some(Control::Flush(ack)) => {
                        self.drain().await;
                        let _ = ack.send(());
                    }
                    Some(Control::Shutdown(ack)) => {
                        self.drain().await;
                        self.exporter.shutdown();
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.drain().await;
                        self.exporter.shutdown();
                        break;
                    }
                },
            }
        }
    }

    /// Timer-driven cycle: retry the held batch, then export the queue.
    async fn export_cycle(&mut self) {
        if !self.retry_pending().await {
            return;
        }

        loop {
            let batch = self.shared.take_batch();
            if batch.is_empty() {
                return;
            }
            if !self.try_export(batch).await {
                return;
            }
        }
    }

    /// Size-triggered cycle: only full batches, and only when nothing is held.
    async fn export_full_batches(&mut self) {
        while self.pending.is_none() && self.shared.queue().len() >= self.shared.max_batch {
            let batch = self.shared.take_batch();
            if !self.try_export(batch).await {
                return;
            }
        }
    }

    /// Export everything, retrying inline with backoff.
    async fn drain(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.export_with_retries(pending.records, pending.failures).await;
        }

        loop {
            let batch = self.shared.take_batch();
            if batch.is_empty() {
                return;
            }
            self.export_with_retries(batch, 0).await;
        }
    }

    /// Retry the held batch once. Returns true when nothing is held anymore
    /// and newer records may be exported.
    async fn retry_pending(&mut self) -> bool {
        let Some(mut pending) = self.pending.take() else {
            return true;
        };

        if self.deliver(&pending.records).await {
            return true;
        }

        pending.failures += 1;
        if pending.failures > self.config.max_export_retries {
            self.give_up(pending.records.len());
            true
        } else {
            self.pending = Some(pending);
            false
        }
    }

    /// First attempt for a fresh batch; on failure it is held for the next cycle.
    async fn try_export(&mut self, batch: Vec<T>) -> bool {
        if self.deliver(&batch).await {
            return true;
        }

        if self.config.max_export_retries == 0 {
            self.give_up(batch.len());
        } else {
            self.pending = Some(PendingBatch {
                records: batch,
                failures: 1,
            });
        }
        false
    }

    async fn export_with_retries(&mut self, batch: Vec<T>, mut failures: u32) {
        loop {
            if failures > 0 {
                time::sleep(retry_delay(
                    failures,
                    self.config.retry_base_delay,
                    self.config.retry_max_delay,
                ))
                .await;
            }
            if self.deliver(&batch).await {
                return;
            }
            failures += 1;
            if failures > self.config.max_export_retries {
                self.give_up(batch.len());
                return;
            }
        }
    }

    async fn deliver(&self, batch: &[T]) -> bool {
        match self.exporter.export(batch).await {
            Ok(()) => {
                self.shared.record_exported(batch.len());
                true
            }
            Err(e) => {
                tracing::warn!(
                    signal = self.shared.signal.as_str(),
                    records = batch.len(),
                    error = %e,
                    "Export attempt failed"
                );
                false
            }
        }
    }

    fn give_up(&self, records: usize) {
        tracing::warn!(
            signal = self.shared.signal.as_str(),
            records,
            retries = self.config.max_export_retries,
            "Retry budget exhausted, dropping batch"
        );
        self.shared.record_dropped(records as u64, "export_failed");
    }
}
