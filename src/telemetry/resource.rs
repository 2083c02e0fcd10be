//! Process identity attached to every exported batch.
//!
//! # Responsibilities
//! - Hold the immutable attribute set describing this process
//! - Parse the flat `key=value,key=value` form used in configuration
//!
//! # Design Decisions
//! - Built once at startup, then shared via `Arc` by every provider
//! - Ordered map so exported envelopes are stable

use serde::Serialize;
use std::collections::BTreeMap;

use crate::telemetry::error::{TelemetryError, TelemetryResult};

pub const SERVICE_NAME: &str = "service.name";
pub const DEFAULT_SERVICE_NAME: &str = "unknown_service";

/// Immutable set of process-identity attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Resource {
    attributes: BTreeMap<String, String>,
}

impl Resource {
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn service_name(&self) -> &str {
        self.get(SERVICE_NAME).unwrap_or(DEFAULT_SERVICE_NAME)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Parse a `key=value,key2=value2` attribute list.
    ///
    /// Empty segments are skipped. A segment without `=` or with an empty key
    /// is rejected.
    pub fn parse_attributes(raw: &str) -> TelemetryResult<Vec<(String, String)>> {
        let mut parsed = Vec::new();
        for segment in raw.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                TelemetryError::Config(format!("resource attribute '{}' is missing '='", segment))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(TelemetryError::Config(format!(
                    "resource attribute '{}' has an empty key",
                    segment
                )));
            }
            parsed.push((key.to_string(), value.trim().to_string()));
        }
        Ok(parsed)
    }
}

/// Collects attributes before freezing them into a [`Resource`].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    service_name: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl ResourceBuilder {
    /// Configured service name. An explicit `service.name` attribute only wins
    /// when this is left unset.
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() && name != DEFAULT_SERVICE_NAME {
            self.service_name = Some(name);
        }
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in attributes {
            self.attributes.insert(key.into(), value.into());
        }
        self
    }

    /// Parse and add a raw `key=value` list.
    pub fn with_raw_attributes(self, raw: &str) -> TelemetryResult<Self> {
        Ok(self.with_attributes(Resource::parse_attributes(raw)?))
    }

    pub fn build(self) -> Resource {
        let mut attributes = BTreeMap::new();
        attributes.insert("telemetry.sdk.name".to_string(), env!("CARGO_PKG_NAME").to_string());
        attributes.insert("telemetry.sdk.language".to_string(), "rust".to_string());
        attributes.insert("telemetry.sdk.version".to_string(), env!("CARGO_PKG_VERSION").to_string());
        attributes.extend(self.attributes);

        match self.service_name {
            Some(name) => {
                attributes.insert(SERVICE_NAME.to_string(), name);
            }
            None => {
                attributes
                    .entry(SERVICE_NAME.to_string())
                    .or_insert_with(|| DEFAULT_SERVICE_NAME.to_string());
            }
        }

        Resource { attributes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes() {
        let parsed = Resource::parse_attributes("service.name=demo, deployment.environment = dev,,").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("service.name".to_string(), "demo".to_string()),
                ("deployment.environment".to_string(), "dev".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Resource::parse_attributes("service.name"),
            Err(TelemetryError::Config(_))
        ));
        assert!(matches!(
            Resource::parse_attributes("=value"),
            Err(TelemetryError::Config(_))
        ));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let parsed = Resource::parse_attributes("query=a=b").unwrap();
        assert_eq!(parsed[0].1, "a=b");
    }

    #[test]
    fn test_service_name_precedence() {
        let resource = Resource::builder()
            .with_attribute(SERVICE_NAME, "from-attributes")
            .build();
        assert_eq!(resource.service_name(), "from-attributes");

        let resource = Resource::builder()
            .with_service_name("from-config")
            .with_attribute(SERVICE_NAME, "from-attributes")
            .build();
        assert_eq!(resource.service_name(), "from-config");

        let resource = Resource::builder().build();
        assert_eq!(resource.service_name(), DEFAULT_SERVICE_NAME);
        assert_eq!(resource.get("telemetry.sdk.language"), Some("rust"));
    }
}
