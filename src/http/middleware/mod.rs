pub mod telemetry;

pub use telemetry::request_telemetry;
