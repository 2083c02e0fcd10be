//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
pub const ENV_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const ENV_METRIC_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
pub const ENV_BIND_ADDRESS: &str = "APP_BIND_ADDRESS";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without validating it.
pub fn read_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load a TOML file (or defaults), apply environment overrides, validate.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config(path)?,
        None => ServiceConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay the process environment onto `config`.
pub fn apply_env_overrides(config: &mut ServiceConfig) -> Result<(), ConfigError> {
    apply_overrides_with(config, |key| std::env::var(key).ok())
}

/// Overlay values from `lookup` onto `config`. Empty values are ignored.
pub fn apply_overrides_with<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(endpoint) = get(ENV_ENDPOINT) {
        config.exporter.endpoint = endpoint.trim().to_string();
    }
    if let Some(raw) = get(ENV_RESOURCE_ATTRIBUTES) {
        config.resource.raw_attributes = Some(raw);
    }
    if let Some(name) = get(ENV_SERVICE_NAME) {
        config.resource.service_name = name.trim().to_string();
    }
    if let Some(interval) = get(ENV_METRIC_INTERVAL) {
        config.exporter.metric_interval_ms =
            interval.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_METRIC_INTERVAL,
                message: format!("'{}': {}", interval, e),
            })?;
    }
    if let Some(bind) = get(ENV_BIND_ADDRESS) {
        config.listener.bind_address = bind.trim().to_string();
    }
    Ok(())
}
