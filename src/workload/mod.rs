//! Synthetic workload subsystem.
//!
//! Keeps the telemetry stream alive without external traffic: a background
//! task logs weighted random events and moves the active-users gauge.

pub mod generator;
pub mod messages;

pub use generator::{GeneratorConfig, SyntheticEvent, WorkloadGenerator};
