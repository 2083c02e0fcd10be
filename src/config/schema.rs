//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::telemetry::processor::BatchConfig;
use crate::telemetry::resource::{Resource, DEFAULT_SERVICE_NAME};
use crate::telemetry::TelemetryResult;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener.
    pub listener: ListenerConfig,

    /// Collector endpoint and pipeline tuning.
    pub exporter: ExporterConfig,

    /// Resource attributes attached to every record.
    pub resource: ResourceConfig,

    /// Process logging.
    pub logging: LoggingConfig,

    /// Synthetic workload generator.
    pub generator: GeneratorSettings,

    /// Prometheus self-metrics.
    pub observability: ObservabilityConfig,

    /// Request timeouts.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Export pipeline configuration, shared by all three signal kinds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Collector root URL; `/v1/<signal>` is appended per pipeline.
    pub endpoint: String,

    /// Per-request export timeout in milliseconds.
    pub timeout_ms: u64,

    /// Queue capacity per pipeline.
    pub max_queue_size: usize,

    /// Records per export call.
    pub max_export_batch_size: usize,

    /// Export timer period in milliseconds.
    pub scheduled_delay_ms: u64,

    /// Retries granted to a failed batch.
    pub max_export_retries: u32,

    /// Retry backoff base in milliseconds.
    pub retry_base_delay_ms: u64,

    /// Retry backoff cap in milliseconds.
    pub retry_max_delay_ms: u64,

    /// Metric collection interval in milliseconds.
    pub metric_interval_ms: u64,

    /// Upper bound for draining each pipeline at shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            timeout_ms: 10_000,
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay_ms: 5_000,
            max_export_retries: 3,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2_000,
            metric_interval_ms: 15_000,
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl ExporterConfig {
    /// Parse the endpoint, accepting only `http`/`https` URLs with a host.
    pub fn endpoint_url(&self) -> Result<Url, String> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| format!("invalid exporter endpoint '{}': {}", self.endpoint, e))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "unsupported exporter endpoint scheme '{}' (expected http or https)",
                url.scheme()
            ));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(format!("exporter endpoint '{}' has no host", self.endpoint));
        }
        Ok(url)
    }

    /// Sizes and periods that would make a pipeline inert.
    pub fn check_limits(&self) -> Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".to_string());
        }
        if self.max_export_batch_size == 0 {
            return Err("max_export_batch_size must be greater than 0".to_string());
        }
        if self.scheduled_delay_ms == 0 {
            return Err("scheduled_delay_ms must be greater than 0".to_string());
        }
        if self.metric_interval_ms == 0 {
            return Err("metric_interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            max_export_batch_size: self.max_export_batch_size,
            scheduled_delay: Duration::from_millis(self.scheduled_delay_ms),
            max_export_retries: self.max_export_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn metric_interval(&self) -> Duration {
        Duration::from_millis(self.metric_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Resource attributes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// `service.name`; left at the default, an explicit attribute may set it.
    pub service_name: String,

    /// Additional attributes.
    pub attributes: BTreeMap<String, String>,

    /// Raw `key=value,key=value` list, as found in `OTEL_RESOURCE_ATTRIBUTES`.
    pub raw_attributes: Option<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            attributes: BTreeMap::new(),
            raw_attributes: None,
        }
    }
}

impl ResourceConfig {
    /// Build the process resource. Raw attributes override table attributes.
    pub fn build_resource(&self) -> TelemetryResult<Resource> {
        let mut builder = Resource::builder()
            .with_attributes(self.attributes.clone())
            .with_service_name(self.service_name.clone());
        if let Some(raw) = &self.raw_attributes {
            builder = builder.with_raw_attributes(raw)?;
        }
        Ok(builder.build())
    }
}

/// Console log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Process logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter directive when `RUST_LOG` is unset.
    pub level: String,

    /// Console output format.
    pub format: LogFormat,

    /// Forward `tracing` events into the log pipeline.
    pub bridge_enabled: bool,

    /// Minimum severity forwarded into the log pipeline.
    pub bridge_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            bridge_enabled: true,
            bridge_level: "debug".to_string(),
        }
    }
}

/// Workload generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub enabled: bool,

    /// Lower bound of the pause between events, in milliseconds.
    pub min_interval_ms: u64,

    /// Upper bound of the pause between events, in milliseconds.
    pub max_interval_ms: u64,

    /// Upper bound of the simulated active-user level.
    pub max_active_users: f64,

    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_ms: 5_000,
            max_interval_ms: 10_000,
            max_active_users: 50.0,
            seed: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus self-metrics endpoint.
    pub metrics_enabled: bool,

    /// Self-metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}
