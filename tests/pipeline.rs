//! End-to-end metric pipeline tests.

use std::sync::Arc;

use telemetry_demo::telemetry::registry::{ACTIVE_USERS, REQUEST_COUNT};
use telemetry_demo::telemetry::{InstrumentRegistry, MetricPoints, TelemetryError};

mod common;

use common::{last_sum, start_telemetry, test_exporter_config, Sinks};

#[tokio::test]
async fn test_request_count_reaches_collector() {
    let sinks = Sinks::default();
    let telemetry = start_telemetry(&test_exporter_config(), &sinks);
    let registry = InstrumentRegistry::new();
    registry
        .configure(&telemetry.providers().unwrap().meter)
        .unwrap();

    let counter = registry.request_count().unwrap();
    for _ in 0..100 {
        counter.add(1, &[("endpoint", "/items"), ("method", "GET")]);
    }

    telemetry.shutdown().await.unwrap();

    let metrics = sinks.metrics.records();
    assert_eq!(
        last_sum(&metrics, REQUEST_COUNT, &[("endpoint", "/items"), ("method", "GET")]),
        Some(100)
    );
    assert!(sinks.metrics.is_shut_down());
}

#[tokio::test]
async fn test_counter_sums_across_tasks() {
    let sinks = Sinks::default();
    let telemetry = start_telemetry(&test_exporter_config(), &sinks);
    let registry = Arc::new(InstrumentRegistry::new());
    registry
        .configure(&telemetry.providers().unwrap().meter)
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let endpoint = if i % 2 == 0 { "/items" } else { "/health" };
                let counter = registry.request_count().unwrap();
                for _ in 0..1_000 {
                    counter.add(1, &[("endpoint", endpoint), ("method", "GET")]);
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let counter = registry.request_count().unwrap();
    assert_eq!(counter.value(&[("endpoint", "/items"), ("method", "GET")]), 4_000);
    assert_eq!(counter.value(&[("method", "GET"), ("endpoint", "/health")]), 4_000);

    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_configure_is_rejected() {
    let sinks = Sinks::default();
    let telemetry = start_telemetry(&test_exporter_config(), &sinks);
    let meter = &telemetry.providers().unwrap().meter;

    let registry = InstrumentRegistry::new();
    registry.configure(meter).unwrap();
    assert!(matches!(
        registry.configure(meter),
        Err(TelemetryError::AlreadyConfigured)
    ));

    // A second registry on the same provider reuses the same instruments.
    let other = InstrumentRegistry::new();
    other.configure(meter).unwrap();

    let mut names = meter.instrument_names();
    names.sort();
    assert_eq!(names, vec![ACTIVE_USERS.to_string(), REQUEST_COUNT.to_string()]);

    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gauge_reports_last_value_untransformed() {
    let sinks = Sinks::default();
    let telemetry = start_telemetry(&test_exporter_config(), &sinks);
    let meter = &telemetry.providers().unwrap().meter;

    let registry = InstrumentRegistry::new();
    registry.configure(meter).unwrap();
    registry.set_active_users(12.0).unwrap();
    registry.set_active_users(42.5).unwrap();

    meter.force_flush().await.unwrap();

    let values: Vec<f64> = sinks
        .metrics
        .records()
        .into_iter()
        .filter(|m| m.name == ACTIVE_USERS)
        .flat_map(|m| match m.data {
            MetricPoints::Gauge { points } => points.into_iter().map(|p| p.value).collect(),
            MetricPoints::Sum { .. } => Vec::new(),
        })
        .collect();
    assert_eq!(values, vec![42.5]);

    telemetry.shutdown().await.unwrap();
}
