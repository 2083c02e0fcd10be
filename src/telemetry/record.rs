//! Record types carried by the three export pipelines.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Flat attribute set used by spans, log records and metric points.
pub type Attributes = BTreeMap<String, String>;

/// Nanoseconds since the unix epoch for `time`.
pub fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

pub fn now_unix_nanos() -> u64 {
    unix_nanos(SystemTime::now())
}

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Severity::Error,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::INFO => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// A single log event bound for the log pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp_unix_nanos: u64,
    pub severity: Severity,
    pub target: String,
    pub body: String,
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl LogRecord {
    pub fn new(severity: Severity, body: impl Into<String>) -> Self {
        Self {
            timestamp_unix_nanos: now_unix_nanos(),
            severity,
            target: String::new(),
            body: body.into(),
            attributes: Attributes::new(),
            trace_id: None,
            span_id: None,
        }
    }
}

/// Completion status of a span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "message", rename_all = "lowercase")]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error(String),
}

/// A finished span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanData {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub start_unix_nanos: u64,
    pub end_unix_nanos: u64,
    pub attributes: Attributes,
    pub status: SpanStatus,
}

/// One measurement for one attribute set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberPoint<T> {
    pub attributes: Attributes,
    pub value: T,
    pub time_unix_nanos: u64,
}

/// Points produced by one instrument in one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricPoints {
    /// Cumulative sum since the instrument was created.
    Sum {
        monotonic: bool,
        points: Vec<NumberPoint<u64>>,
    },
    Gauge {
        points: Vec<NumberPoint<f64>>,
    },
}

/// Output of one instrument for one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricData {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub data: MetricPoints,
}
