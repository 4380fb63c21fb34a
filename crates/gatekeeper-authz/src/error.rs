//! Error types for the decision core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors that can occur while gating callers, refreshing facts, or evaluating rules.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// The caller could not be authenticated or is not allowed to call.
    ///
    /// Carries no detail on purpose; the precise reason is only logged.
    #[error("forbidden")]
    Forbidden,

    /// The decision request body is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The directory or session service could not be reached or answered badly.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A rule module failed to compile or the rule set is inconsistent.
    #[error("failed to compile rule module {module}: {message}")]
    Compilation {
        /// Name of the offending module.
        module: String,
        /// Error message.
        message: String,
    },

    /// Query construction, evaluation, or result decoding failed.
    #[error("evaluation of {query} failed: {message}")]
    Evaluation {
        /// Query name being evaluated.
        query: String,
        /// Error message.
        message: String,
    },

    /// Bundle loading failed.
    #[error("failed to load bundle from {path}: {message}")]
    BundleLoad {
        /// Path to the bundle.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Bundle parsing failed.
    #[error("failed to parse bundle: {0}")]
    BundleParse(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuthzError {
    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(message.into())
    }

    /// Create a compilation error.
    pub fn compilation(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compilation {
            module: module.into(),
            message: message.into(),
        }
    }

    /// Create an evaluation error.
    pub fn evaluation(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a bundle load error.
    pub fn bundle_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::BundleLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this is a forbidden error.
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Check if this is a bad request error.
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_))
    }

    /// Check if this is a compilation error.
    pub const fn is_compilation(&self) -> bool {
        matches!(self, Self::Compilation { .. })
    }

    /// Check if this is an evaluation error.
    pub const fn is_evaluation(&self) -> bool {
        matches!(self, Self::Evaluation { .. })
    }
}
