//! Telemetry demo service library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;
pub mod workload;

pub use config::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::Telemetry;
