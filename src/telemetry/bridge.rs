//! Logging bridge: `tracing` events into the log pipeline.
//!
//! # Responsibilities
//! - Convert each event at or above the minimum severity into a `LogRecord`
//! - Attach trace/span ids from the enclosing request span
//! - Keep the exporter's own HTTP traffic out of the pipeline
//!
//! # Design Decisions
//! - A `Layer`, so it composes with the console formatter in one subscriber
//! - Correlation ids are read once per span (`on_new_span`) and kept in span
//!   extensions, not re-parsed per event

use std::fmt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes as SpanAttributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::telemetry::provider::LoggerProvider;
use crate::telemetry::record::{Attributes, LogRecord, Severity};

/// Targets whose events never reach the log pipeline.
const SILENCED_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "tower",
    "telemetry_demo::telemetry",
];

/// Span field names carrying correlation ids.
pub const TRACE_ID_FIELD: &str = "trace_id";
pub const SPAN_ID_FIELD: &str = "span_id";

/// Forwards `tracing` events to a [`LoggerProvider`].
pub struct LogBridgeLayer {
    logger: LoggerProvider,
    min_severity: Severity,
}

impl LogBridgeLayer {
    pub fn new(logger: LoggerProvider, min_severity: Severity) -> Self {
        Self { logger, min_severity }
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Per-layer filter: the client stack and the pipeline's own targets
    /// switched off, every level enabled otherwise.
    ///
    /// The severity threshold is applied to events in `on_event`. Spans below
    /// it must still reach the layer so their correlation ids are recorded.
    pub fn targets(&self) -> Targets {
        SILENCED_TARGETS.iter().fold(
            Targets::new().with_default(LevelFilter::TRACE),
            |targets, target| targets.with_target(*target, LevelFilter::OFF),
        )
    }
}

#[derive(Clone)]
struct SpanCorrelation {
    trace_id: String,
    span_id: String,
}

#[derive(Default)]
struct CorrelationVisitor {
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl Visit for CorrelationVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            TRACE_ID_FIELD => self.trace_id = Some(value.to_string()),
            SPAN_ID_FIELD => self.span_id = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            TRACE_ID_FIELD => self.trace_id = Some(format!("{:?}", value).trim_matches('"').to_string()),
            SPAN_ID_FIELD => self.span_id = Some(format!("{:?}", value).trim_matches('"').to_string()),
            _ => {}
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    body: Option<String>,
    attributes: Attributes,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.body = Some(value.to_string());
        } else {
            self.attributes.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.body = Some(format!("{:?}", value));
        } else {
            self.attributes
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

impl<S> Layer<S> for LogBridgeLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &SpanAttributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = CorrelationVisitor::default();
        attrs.record(&mut visitor);

        if let (Some(trace_id), Some(span_id)) = (visitor.trace_id, visitor.span_id) {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut()
                    .insert(SpanCorrelation { trace_id, span_id });
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let severity = Severity::from(metadata.level());
        if severity < self.min_severity {
            return;
        }

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(severity, visitor.body.unwrap_or_default());
        record.target = metadata.target().to_string();
        record.attributes = visitor.attributes;

        if let Some(scope) = ctx.event_scope(event) {
            let correlation = scope
                .into_iter()
                .find_map(|span| span.extensions().get::<SpanCorrelation>().cloned());
            if let Some(correlation) = correlation {
                record.trace_id = Some(correlation.trace_id);
                record.span_id = Some(correlation.span_id);
            }
        }

        self.logger.emit(record);
    }
}
