//! Metric instruments.
//!
//! # Responsibilities
//! - Counters: cumulative, per-label-set accumulators
//! - Observable gauges: no storage, sampled through a callback at collection time
//! - Collection: turn every registered instrument into a `MetricData`
//!
//! # Design Decisions
//! - Counter values live in a `DashMap` of atomics: increments on an existing
//!   label set never take a write lock and never lose updates
//! - Instruments are de-duplicated by name within one meter provider; a name
//!   already taken by the other kind yields a detached instrument that is
//!   never collected
//! - Gauge callbacks run on the collection task and must not block

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::telemetry::record::{now_unix_nanos, Attributes, MetricData, MetricPoints, NumberPoint};

fn to_attributes(labels: &[(&str, &str)]) -> Attributes {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Clone)]
struct Descriptor {
    name: String,
    description: String,
    unit: String,
}

struct CounterState {
    descriptor: Descriptor,
    values: DashMap<Attributes, AtomicU64>,
}

/// Monotonic counter keyed by label set.
#[derive(Clone)]
pub struct Counter {
    state: Arc<CounterState>,
}

impl Counter {
    /// Add `delta` to the series identified by `labels`.
    pub fn add(&self, delta: u64, labels: &[(&str, &str)]) {
        let key = to_attributes(labels);
        if let Some(value) = self.state.values.get(&key) {
            value.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.state
            .values
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Current cumulative value for `labels` (0 if never incremented).
    pub fn value(&self, labels: &[(&str, &str)]) -> u64 {
        self.state
            .values
            .get(&to_attributes(labels))
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        &self.state.descriptor.name
    }

    fn collect(&self, time_unix_nanos: u64) -> MetricData {
        let mut points: Vec<NumberPoint<u64>> = self
            .state
            .values
            .iter()
            .map(|entry| NumberPoint {
                attributes: entry.key().clone(),
                value: entry.value().load(Ordering::Relaxed),
                time_unix_nanos,
            })
            .collect();
        points.sort_by(|a, b| a.attributes.cmp(&b.attributes));

        MetricData {
            name: self.state.descriptor.name.clone(),
            description: self.state.descriptor.description.clone(),
            unit: self.state.descriptor.unit.clone(),
            data: MetricPoints::Sum {
                monotonic: true,
                points,
            },
        }
    }
}

/// One value reported by a gauge callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub value: f64,
    pub attributes: Attributes,
}

impl Observation {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

type GaugeCallback = Box<dyn Fn() -> Vec<Observation> + Send + Sync>;

struct GaugeState {
    descriptor: Descriptor,
    callback: GaugeCallback,
}

/// Gauge whose value is produced on demand by a callback.
#[derive(Clone)]
pub struct ObservableGauge {
    state: Arc<GaugeState>,
}

impl ObservableGauge {
    pub fn name(&self) -> &str {
        &self.state.descriptor.name
    }

    /// Invoke the callback now.
    pub fn observe(&self) -> Vec<Observation> {
        (self.state.callback)()
    }

    fn collect(&self, time_unix_nanos: u64) -> MetricData {
        let points = self
            .observe()
            .into_iter()
            .map(|obs| NumberPoint {
                attributes: obs.attributes,
                value: obs.value,
                time_unix_nanos,
            })
            .collect();

        MetricData {
            name: self.state.descriptor.name.clone(),
            description: self.state.descriptor.description.clone(),
            unit: self.state.descriptor.unit.clone(),
            data: MetricPoints::Gauge { points },
        }
    }
}

#[derive(Clone)]
enum Instrument {
    Counter(Counter),
    Gauge(ObservableGauge),
}

impl Instrument {
    fn name(&self) -> &str {
        match self {
            Instrument::Counter(c) => c.name(),
            Instrument::Gauge(g) => g.name(),
        }
    }
}

/// Every instrument created against one meter provider.
#[derive(Default)]
pub struct InstrumentStore {
    instruments: Mutex<Vec<Instrument>>,
}

impl InstrumentStore {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|i| i.name().to_string()).collect()
    }

    /// Produce one `MetricData` per instrument, in registration order.
    pub fn collect(&self) -> Vec<MetricData> {
        // Callbacks run without the registration lock held.
        let instruments = self.lock().clone();
        let now = now_unix_nanos();
        instruments
            .iter()
            .map(|instrument| match instrument {
                Instrument::Counter(c) => c.collect(now),
                Instrument::Gauge(g) => g.collect(now),
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Instrument>> {
        self.instruments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_counter(&self, descriptor: Descriptor) -> Counter {
        let mut instruments = self.lock();
        let existing = instruments.iter().find(|i| i.name() == descriptor.name).cloned();
        let detached = match existing {
            Some(Instrument::Counter(counter)) => {
                tracing::debug!(name = %descriptor.name, "Reusing existing counter");
                return counter;
            }
            Some(Instrument::Gauge(_)) => {
                tracing::warn!(name = %descriptor.name, "Counter name already used by a gauge, counter will not be exported");
                true
            }
            None => false,
        };

        let counter = Counter {
            state: Arc::new(CounterState {
                descriptor,
                values: DashMap::new(),
            }),
        };
        if !detached {
            instruments.push(Instrument::Counter(counter.clone()));
        }
        counter
    }

    fn register_gauge(&self, descriptor: Descriptor, callback: GaugeCallback) -> ObservableGauge {
        let mut instruments = self.lock();
        let existing = instruments.iter().find(|i| i.name() == descriptor.name).cloned();
        let detached = match existing {
            Some(Instrument::Gauge(gauge)) => {
                tracing::warn!(name = %descriptor.name, "Gauge already registered, new callback ignored");
                return gauge;
            }
            Some(Instrument::Counter(_)) => {
                tracing::warn!(name = %descriptor.name, "Gauge name already used by a counter, gauge will not be exported");
                true
            }
            None => false,
        };

        let gauge = ObservableGauge {
            state: Arc::new(GaugeState { descriptor, callback }),
        };
        if !detached {
            instruments.push(Instrument::Gauge(gauge.clone()));
        }
        gauge
    }
}

/// Creates instruments bound to one provider's store.
#[derive(Clone)]
pub struct Meter {
    scope: String,
    store: Arc<InstrumentStore>,
}

impl Meter {
    pub(crate) fn new(scope: impl Into<String>, store: Arc<InstrumentStore>) -> Self {
        Self {
            scope: scope.into(),
            store,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn u64_counter(&self, name: impl Into<String>) -> CounterBuilder<'_> {
        CounterBuilder {
            meter: self,
            descriptor: Descriptor {
                name: name.into(),
                description: String::new(),
                unit: String::new(),
            },
        }
    }

    pub fn f64_observable_gauge(&self, name: impl Into<String>) -> GaugeBuilder<'_> {
        GaugeBuilder {
            meter: self,
            descriptor: Descriptor {
                name: name.into(),
                description: String::new(),
                unit: String::new(),
            },
            callback: None,
        }
    }
}

pub struct CounterBuilder<'a> {
    meter: &'a Meter,
    descriptor: Descriptor,
}

impl CounterBuilder<'_> {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.descriptor.unit = unit.into();
        self
    }

    pub fn build(self) -> Counter {
        self.meter.store.register_counter(self.descriptor)
    }
}

pub struct GaugeBuilder<'a> {
    meter: &'a Meter,
    descriptor: Descriptor,
    callback: Option<GaugeCallback>,
}

impl GaugeBuilder<'_> {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.descriptor.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.descriptor.unit = unit.into();
        self
    }

    /// Sampling callback. Runs on the collection task; must return promptly.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn() -> Vec<Observation> + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> ObservableGauge {
        let callback: GaugeCallback = match self.callback {
            Some(callback) => callback,
            None => Box::new(Vec::new),
        };
        self.meter.store.register_gauge(self.descriptor, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter() -> Meter {
        Meter::new("test", Arc::new(InstrumentStore::default()))
    }

    #[test]
    fn test_counter_accumulates_per_label_set() {
        let counter = meter().u64_counter("requests").build();
        counter.add(2, &[("endpoint", "/items"), ("method", "GET")]);
        counter.add(3, &[("method", "GET"), ("endpoint", "/items")]);
        counter.add(1, &[("endpoint", "/health"), ("method", "GET")]);

        assert_eq!(counter.value(&[("endpoint", "/items"), ("method", "GET")]), 5);
        assert_eq!(counter.value(&[("endpoint", "/health"), ("method", "GET")]), 1);
        assert_eq!(counter.value(&[("endpoint", "/crash"), ("method", "GET")]), 0);
    }

    #[test]
    fn test_counter_concurrent_adds_are_not_lost() {
        let counter = meter().u64_counter("requests").build();
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    for i in 0..1000u64 {
                        counter.add(i % 3 + t, &[("endpoint", "/items"), ("method", "GET")]);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let expected: u64 = (0..8u64)
            .map(|t| (0..1000u64).map(|i| i % 3 + t).sum::<u64>())
            .sum();
        assert_eq!(counter.value(&[("endpoint", "/items"), ("method", "GET")]), expected);
    }

    #[test]
    fn test_instruments_are_deduplicated_by_name() {
        let meter = meter();
        let first = meter.u64_counter("requests").build();
        let second = meter.u64_counter("requests").with_description("again").build();
        first.add(1, &[]);
        second.add(1, &[]);

        assert_eq!(first.value(&[]), 2);
        assert_eq!(meter.store.len(), 1);

        meter.f64_observable_gauge("users").with_callback(|| vec![Observation::new(1.0)]).build();
        let gauge = meter.f64_observable_gauge("users").with_callback(|| vec![Observation::new(2.0)]).build();
        assert_eq!(meter.store.len(), 2);
        assert_eq!(gauge.observe(), vec![Observation::new(1.0)]);
    }

    #[test]
    fn test_name_taken_by_other_kind_is_not_collected() {
        let meter = meter();
        meter
            .f64_observable_gauge("users")
            .with_callback(|| vec![Observation::new(3.0)])
            .build();
        let counter = meter.u64_counter("users").build();
        counter.add(1, &[]);
        assert_eq!(counter.value(&[]), 1);

        let requests = meter.u64_counter("requests").build();
        requests.add(2, &[]);
        let gauge = meter
            .f64_observable_gauge("requests")
            .with_callback(|| vec![Observation::new(9.0)])
            .build();
        assert_eq!(gauge.observe(), vec![Observation::new(9.0)]);

        assert_eq!(meter.store.names(), vec!["users".to_string(), "requests".to_string()]);
        let collected = meter.store.collect();
        assert_eq!(collected.len(), 2);
        assert!(matches!(collected[0].data, MetricPoints::Gauge { .. }));
        assert!(matches!(collected[1].data, MetricPoints::Sum { .. }));
    }

    #[test]
    fn test_collect_produces_sum_and_gauge() {
        let meter = meter();
        let counter = meter.u64_counter("requests").with_unit("1").build();
        counter.add(4, &[("method", "GET")]);
        meter
            .f64_observable_gauge("users")
            .with_callback(|| vec![Observation::new(12.5)])
            .build();

        let collected = meter.store.collect();
        assert_eq!(collected.len(), 2);
        match &collected[0].data {
            MetricPoints::Sum { monotonic, points } => {
                assert!(*monotonic);
                assert_eq!(points[0].value, 4);
                assert_eq!(points[0].attributes.get("method").map(String::as_str), Some("GET"));
            }
            other => panic!("unexpected data {:?}", other),
        }
        match &collected[1].data {
            MetricPoints::Gauge { points } => assert_eq!(points[0].value, 12.5),
            other => panic!("unexpected data {:?}", other),
        }
    }
}
