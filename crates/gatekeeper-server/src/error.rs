//! Error types for the Gatekeeper HTTP binding.

use std::fmt;

use gatekeeper_authz::AuthzError;
use gatekeeper_config::ConfigError;
use thiserror::Error;

/// Server-level errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from the decision core.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// Listener or connection setup failure.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response construction failure.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl ServerError {
    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authz(AuthzError::BadRequest(_)) => 400,
            Self::Authz(_) => 403,
            Self::Config(_) => 500,
            Self::Server { .. } => 500,
            Self::Io(_) => 500,
            Self::Http(_) => 500,
        }
    }

    /// Get the error category for logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Authz(AuthzError::BadRequest(_)) => "bad_request",
            Self::Authz(_) => "forbidden",
            Self::Server { .. } => "server",
            Self::Io(_) => "io",
            Self::Http(_) => "http",
        }
    }

    /// Message safe to return to a caller.
    ///
    /// Authorization failures never say why they failed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Authz(AuthzError::BadRequest(detail)) => detail.clone(),
            Self::Authz(_) => "Forbidden".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// JSON error body.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&ServerError> for ErrorResponse {
    fn from(err: &ServerError) -> Self {
        Self::new(err.category(), err.public_message())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
