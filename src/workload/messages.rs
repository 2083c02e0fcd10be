//! Message catalogue for synthetic log events.

use crate::telemetry::record::Severity;

pub const INFO_MESSAGES: &[&str] = &[
    "User session initialised",
    "Cache hit, returning stored result",
    "Health check passed",
    "Database query completed in 12ms",
    "Config reloaded successfully",
    "Background task completed",
    "Outgoing request dispatched",
    "Response serialised in 3ms",
];

pub const WARNING_MESSAGES: &[&str] = &[
    "Cache miss, fetching from origin",
    "Slow database query detected (>200ms)",
    "Retry attempt 1/3 for downstream service",
    "Memory usage above 70%",
    "Rate limit approaching for external API",
    "Deprecated endpoint called, please migrate",
];

pub const ERROR_MESSAGES: &[&str] = &[
    "Database connection timed out",
    "Failed to reach downstream service",
    "Unexpected null value in response payload",
    "Serialisation error, skipping record",
    "Auth token validation failed",
];

/// Relative frequency of each generated severity.
pub const SEVERITY_WEIGHTS: [(Severity, u32); 3] = [
    (Severity::Info, 6),
    (Severity::Warning, 3),
    (Severity::Error, 1),
];

/// Messages available at `severity`. Debug has none.
pub fn messages_for(severity: Severity) -> &'static [&'static str] {
    match severity {
        Severity::Debug => &[],
        Severity::Info => INFO_MESSAGES,
        Severity::Warning => WARNING_MESSAGES,
        Severity::Error => ERROR_MESSAGES,
    }
}
