//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (OTEL_* / APP_* environment overrides)
//!     → CLI flags (main.rs)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::ConfigError;
pub use schema::{
    ExporterConfig, GeneratorSettings, ListenerConfig, LogFormat, LoggingConfig,
    ObservabilityConfig, ResourceConfig, ServiceConfig, TimeoutConfig,
};
pub use validation::ValidationError;
