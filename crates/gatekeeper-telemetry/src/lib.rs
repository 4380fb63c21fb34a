//! Logging setup for Gatekeeper.
//!
//! Gatekeeper reports through `tracing` events and spans; this crate installs
//! the global `tracing-subscriber` pipeline that renders them, as JSON in
//! production and as pretty text during development.
//!
//! Counters (`gatekeeper_decisions_total`, `gatekeeper_refresh_attempts_total`)
//! go through the `metrics` facade. No recorder is installed here, so they
//! are no-ops unless the embedding process installs one.

#![warn(missing_docs)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
