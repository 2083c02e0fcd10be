//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, bounds ordered)
//! - Validate addresses and the collector endpoint
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;
use crate::telemetry::record::Severity;
use crate::telemetry::resource::Resource;

/// One rejected configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let exporter = &config.exporter;
    if let Err(e) = exporter.endpoint_url() {
        errors.push(ValidationError::new("exporter.endpoint", e));
    }
    if let Err(e) = exporter.check_limits() {
        errors.push(ValidationError::new("exporter", e));
    }
    if exporter.timeout_ms == 0 {
        errors.push(ValidationError::new("exporter.timeout_ms", "must be greater than 0"));
    }
    if exporter.retry_base_delay_ms > exporter.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "exporter.retry_base_delay_ms",
            "must not exceed retry_max_delay_ms",
        ));
    }

    if let Some(raw) = &config.resource.raw_attributes {
        if let Err(e) = Resource::parse_attributes(raw) {
            errors.push(ValidationError::new("resource.raw_attributes", e.to_string()));
        }
    }

    if config.logging.bridge_level.parse::<Severity>().is_err() {
        errors.push(ValidationError::new(
            "logging.bridge_level",
            format!("unknown severity '{}'", config.logging.bridge_level),
        ));
    }

    let generator = &config.generator;
    if generator.min_interval_ms > generator.max_interval_ms {
        errors.push(ValidationError::new(
            "generator.min_interval_ms",
            "must not exceed max_interval_ms",
        ));
    }
    if !generator.max_active_users.is_finite() || generator.max_active_users < 0.0 {
        errors.push(ValidationError::new(
            "generator.max_active_users",
            "must be a finite, non-negative number",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.exporter.endpoint = "grpc://collector".to_string();
        config.exporter.max_export_batch_size = 0;
        config.generator.min_interval_ms = 20_000;
        config.resource.raw_attributes = Some("missing-equals".to_string());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "exporter.endpoint",
                "exporter",
                "resource.raw_attributes",
                "generator.min_interval_ms",
            ]
        );
    }
}
