//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration file {path}: {source}")]
    File {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Neither TOML nor JSON.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Malformed TOML, or a TOML document with unknown fields.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a JSON document with unknown fields.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file exists but does not parse.
    #[error("invalid .env file: {0}")]
    DotEnv(String),

    /// An environment override could not be applied.
    #[error("cannot apply environment variable {var}: {reason}")]
    Env {
        /// Variable name.
        var: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A loaded value failed validation.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `directory.url`.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A required value is empty.
    #[error("{field} must be set")]
    MissingField {
        /// Dotted field path.
        field: String,
    },
}

impl ConfigError {
    /// File read failure.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Invalid value for a dotted field path.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Missing value for a dotted field path.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Environment override failure.
    pub fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error comes from reading a file.
    pub const fn is_file_error(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// Check if the error comes from validating loaded values.
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::InvalidValue { .. } | Self::MissingField { .. })
    }
}
