//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeout, access log)
//!     → middleware/telemetry.rs (server span, request count, log correlation)
//!     → handlers.rs (health, items, crash)
//!     → error.rs (AppError / panic → JSON error body)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use error::AppError;
pub use server::{AppState, HttpServer};
