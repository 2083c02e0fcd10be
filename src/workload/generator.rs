//! Synthetic workload generator.
//!
//! # Responsibilities
//! - Emit a weighted random log event every few seconds
//! - Publish a new simulated active-user level after each event
//!
//! # Design Decisions
//! - Events go through `tracing`, so they reach the log pipeline via the bridge
//!   exactly like application logs
//! - The event draw is a pure function of the RNG, separate from the loop

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::GeneratorSettings;
use crate::lifecycle::Shutdown;
use crate::telemetry::record::Severity;
use crate::telemetry::registry::InstrumentRegistry;
use crate::workload::messages::{messages_for, SEVERITY_WEIGHTS};

/// Target of every generated event.
pub const TARGET: &str = "log_generator";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub max_active_users: f64,
    pub seed: Option<u64>,
    pub enabled: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::from(&GeneratorSettings::default())
    }
}

impl From<&GeneratorSettings> for GeneratorConfig {
    fn from(settings: &GeneratorSettings) -> Self {
        Self {
            min_interval: Duration::from_millis(settings.min_interval_ms),
            max_interval: Duration::from_millis(settings.max_interval_ms),
            max_active_users: settings.max_active_users,
            seed: settings.seed,
            enabled: settings.enabled,
        }
    }
}

/// One generated event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticEvent {
    pub severity: Severity,
    pub message: &'static str,
    pub active_users: f64,
}

impl SyntheticEvent {
    fn log(&self) {
        match self.severity {
            Severity::Debug => tracing::debug!(target: TARGET, "{}", self.message),
            Severity::Info => tracing::info!(target: TARGET, "{}", self.message),
            Severity::Warning => tracing::warn!(target: TARGET, "{}", self.message),
            Severity::Error => tracing::error!(target: TARGET, "{}", self.message),
        }
    }
}

pub struct WorkloadGenerator {
    registry: Arc<InstrumentRegistry>,
    config: GeneratorConfig,
}

impl WorkloadGenerator {
    pub fn new(registry: Arc<InstrumentRegistry>, config: GeneratorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Draw one event: severity by weight, a message of that severity, and a
    /// uniform active-user level in `[0, max_active_users]`.
    pub fn next_event<R: Rng + ?Sized>(&self, rng: &mut R) -> SyntheticEvent {
        let severity = pick_severity(rng);
        let messages = messages_for(severity);
        let message = if messages.is_empty() {
            ""
        } else {
            messages[rng.gen_range(0..messages.len())]
        };
        let active_users = rng.gen_range(0.0..=self.config.max_active_users.max(0.0));

        SyntheticEvent {
            severity,
            message,
            active_users,
        }
    }

    fn next_pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.config.min_interval;
        let max = self.config.max_interval.max(min);
        if min == max {
            return min;
        }
        rng.gen_range(min..=max)
    }

    /// Spawn the generator loop. It exits as soon as `shutdown` fires, even
    /// mid-pause.
    pub fn start(self, shutdown: &Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown.signalled()))
    }

    async fn run(self, stop: impl Future<Output = ()> + Send + 'static) {
        if !self.config.enabled {
            tracing::info!(target: TARGET, "Log generator disabled");
            return;
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::info!(
            target: TARGET,
            min_interval_ms = self.config.min_interval.as_millis() as u64,
            max_interval_ms = self.config.max_interval.as_millis() as u64,
            "Log generator started"
        );

        tokio::pin!(stop);
        loop {
            let pause = self.next_pause(&mut rng);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut stop => {
                    tracing::info!(target: TARGET, "Log generator received shutdown signal, exiting loop");
                    break;
                }
            }

            let event = self.next_event(&mut rng);
            event.log();

            if let Err(e) = self.registry.set_active_users(event.active_users) {
                tracing::warn!(target: TARGET, error = %e, "Failed to update active users gauge");
            }
        }
    }
}

fn pick_severity<R: Rng + ?Sized>(rng: &mut R) -> Severity {
    let total: u32 = SEVERITY_WEIGHTS.iter().map(|(_, weight)| weight).sum();
    let mut roll = rng.gen_range(0..total);
    for (severity, weight) in SEVERITY_WEIGHTS {
        if roll < weight {
            return severity;
        }
        roll -= weight;
    }
    Severity::Info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(config: GeneratorConfig) -> (WorkloadGenerator, Arc<InstrumentRegistry>) {
        let registry = Arc::new(InstrumentRegistry::new());
        (WorkloadGenerator::new(registry.clone(), config), registry)
    }

    #[test]
    fn test_severity_mix_matches_weights() {
        let (generator, _) = generator(GeneratorConfig::default());
        let mut rng = StdRng::seed_from_u64(42);

        let draws = 10_000;
        let mut counts = [0u32; 3];
        for _ in 0..draws {
            match generator.next_event(&mut rng).severity {
                Severity::Info => counts[0] += 1,
                Severity::Warning => counts[1] += 1,
                Severity::Error => counts[2] += 1,
                Severity::Debug => panic!("generator never emits debug"),
            }
        }

        let expected = [6000.0, 3000.0, 1000.0];
        let chi_squared: f64 = counts
            .iter()
            .zip(expected)
            .map(|(&observed, expected)| (observed as f64 - expected).powi(2) / expected)
            .sum();

        // df = 2, p = 0.001
        assert!(chi_squared < 13.82, "chi-squared {} for {:?}", chi_squared, counts);
    }

    #[test]
    fn test_events_stay_in_range() {
        let (generator, _) = generator(GeneratorConfig::default());
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1_000 {
            let event = generator.next_event(&mut rng);
            assert!((0.0..=50.0).contains(&event.active_users));
            assert!(messages_for(event.severity).contains(&event.message));
        }
    }

    #[test]
    fn test_pause_within_bounds() {
        let (generator, _) = generator(GeneratorConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let pause = generator.next_pause(&mut rng);
            assert!(pause >= Duration::from_secs(5) && pause <= Duration::from_secs(10));
        }
    }

    #[tokio::test]
    async fn test_loop_updates_gauge_and_stops() {
        let (generator, registry) = generator(GeneratorConfig {
            min_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(10),
            seed: Some(1),
            ..GeneratorConfig::default()
        });
        let shutdown = Shutdown::new();
        let handle = generator.start(&shutdown);

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        let users = registry.sample_active_users();
        assert!(users > 0.0 && users <= 50.0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_pause() {
        let (generator, _) = generator(GeneratorConfig {
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(60),
            ..GeneratorConfig::default()
        });
        let shutdown = Shutdown::new();
        let handle = generator.start(&shutdown);

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        assert!(tokio::time::timeout(Duration::from_millis(500), handle).await.is_ok());
    }
}
