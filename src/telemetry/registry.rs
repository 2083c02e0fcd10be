//! Application instruments.
//!
//! Holds the request counter and the active-users gauge, created once
//! against the meter provider. The gauge samples a shared cell that the
//! workload generator writes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::telemetry::error::{TelemetryError, TelemetryResult};
use crate::telemetry::instrument::{Counter, ObservableGauge, Observation};
use crate::telemetry::provider::MeterProvider;

pub const METER_SCOPE: &str = "telemetry_demo";
pub const REQUEST_COUNT: &str = "http_request_count";
pub const ACTIVE_USERS: &str = "active_simulated_users";

/// A lock-free `f64` cell. Readers see the last complete write.
#[derive(Debug, Default)]
pub struct GaugeCell {
    bits: AtomicU64,
}

impl GaugeCell {
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

struct Instruments {
    request_count: Counter,
    active_users: ObservableGauge,
}

/// The application's instruments, configured once per process.
pub struct InstrumentRegistry {
    active_users: Arc<GaugeCell>,
    instruments: OnceLock<Instruments>,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        Self {
            active_users: Arc::new(GaugeCell::default()),
            instruments: OnceLock::new(),
        }
    }

    /// Create the counter and gauge on `provider`.
    ///
    /// A second call is rejected and creates nothing.
    pub fn configure(&self, provider: &MeterProvider) -> TelemetryResult<()> {
        if self.instruments.get().is_some() {
            return Err(TelemetryError::AlreadyConfigured);
        }

        let mut created = false;
        self.instruments.get_or_init(|| {
            created = true;
            let meter = provider.meter(METER_SCOPE);

            let request_count = meter
                .u64_counter(REQUEST_COUNT)
                .with_description("Total number of HTTP requests")
                .with_unit("1")
                .build();

            let cell = self.active_users.clone();
            let active_users = meter
                .f64_observable_gauge(ACTIVE_USERS)
                .with_description("Number of simulated active users")
                .with_unit("1")
                .with_callback(move || vec![Observation::new(cell.get())])
                .build();

            Instruments {
                request_count,
                active_users,
            }
        });

        if !created {
            return Err(TelemetryError::AlreadyConfigured);
        }
        tracing::debug!(scope = METER_SCOPE, "Application instruments registered");
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.instruments.get().is_some()
    }

    /// The request counter.
    pub fn request_count(&self) -> TelemetryResult<&Counter> {
        self.instruments
            .get()
            .map(|i| &i.request_count)
            .ok_or(TelemetryError::NotConfigured)
    }

    pub fn active_users_gauge(&self) -> TelemetryResult<&ObservableGauge> {
        self.instruments
            .get()
            .map(|i| &i.active_users)
            .ok_or(TelemetryError::NotConfigured)
    }

    /// Publish a new active-user level for the next gauge sample.
    pub fn set_active_users(&self, value: f64) -> TelemetryResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(TelemetryError::InvalidObservation(value));
        }
        self.active_users.set(value);
        Ok(())
    }

    /// What the gauge would report if sampled now.
    pub fn sample_active_users(&self) -> f64 {
        self.active_users.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_cell_roundtrip() {
        let cell = GaugeCell::default();
        assert_eq!(cell.get(), 0.0);
        cell.set(42.5);
        assert_eq!(cell.get(), 42.5);
    }

    #[test]
    fn test_request_count_before_configure() {
        let registry = InstrumentRegistry::new();
        assert!(!registry.is_configured());
        assert!(matches!(registry.request_count(), Err(TelemetryError::NotConfigured)));
    }

    #[test]
    fn test_set_active_users_rejects_invalid() {
        let registry = InstrumentRegistry::new();
        registry.set_active_users(17.25).unwrap();
        assert_eq!(registry.sample_active_users(), 17.25);

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                registry.set_active_users(bad),
                Err(TelemetryError::InvalidObservation(_))
            ));
        }
        assert_eq!(registry.sample_active_users(), 17.25);
    }
}
