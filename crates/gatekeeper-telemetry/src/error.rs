//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur during telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Invalid log filter directive.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
}

impl TelemetryError {
    /// Check if this error comes from a bad filter directive.
    pub const fn is_invalid_filter(&self) -> bool {
        matches!(self, Self::InvalidFilter(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::LoggingInit("already set".to_string());
        assert_eq!(err.to_string(), "Failed to initialize logging: already set");
    }

    #[test]
    fn test_invalid_filter_predicate() {
        assert!(TelemetryError::InvalidFilter("x=".to_string()).is_invalid_filter());
        assert!(!TelemetryError::LoggingInit("x".to_string()).is_invalid_filter());
    }
}
