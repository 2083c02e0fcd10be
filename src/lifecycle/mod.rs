//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs, startup.rs):
//!     Load config → Validate → Telemetry → Logging → Instruments
//!     → HTTP listener bound → Generator → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server and generator stop
//!     → Telemetry drains its pipelines → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, telemetry before anything that emits
//! - Ordered shutdown: producers stop before pipelines drain
//! - Pipeline drain has a timeout: undelivered records are dropped, not awaited
//! - Pipelines drain on startup failures as well

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{run_service, StartupError};
