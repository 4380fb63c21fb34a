//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Signing secret used by local development session services.
pub const DEFAULT_TOKEN_SECRET: &str =
    "This is a local API secret for everyone. BsscSHqSHiwrBMJsEGqbvXiuIUPAjQXU";

/// Server secret used by local development session services.
pub const DEFAULT_SERVER_SECRET: &str =
    "This needs to be the same secret everywhere. YaHut75NsK1f9UKUXuWqxNN0RUwHFBCy";

/// Server configuration section.
///
/// # Example
///
/// ```
/// use gatekeeper_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "0.0.0.0:9123".to_string(),
///     shutdown_timeout_secs: 30,
///     request_timeout_ms: 30000,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:9123").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:9123".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30000
}

/// Caller authentication section.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 secret shared with the session service.
    #[serde(default = "default_token_secret")]
    pub token_secret: String,

    /// Header carrying the caller's session token.
    #[serde(default = "default_session_header")]
    pub session_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            session_header: default_session_header(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("session_header", &self.session_header)
            .finish()
    }
}

fn default_token_secret() -> String {
    DEFAULT_TOKEN_SECRET.to_string()
}

fn default_session_header() -> String {
    "x-tidepool-session-token".to_string()
}

/// Upstream directory section.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Directory service base URL.
    #[serde(default = "default_directory_url")]
    pub url: String,

    /// Session service base URL, used for server login.
    #[serde(default = "default_session_url")]
    pub session_url: String,

    /// Service account name.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Service account secret.
    #[serde(default = "default_server_secret")]
    pub server_secret: String,

    /// HTTP client timeout in seconds. None means no timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            url: default_directory_url(),
            session_url: default_session_url(),
            server_name: default_server_name(),
            server_secret: default_server_secret(),
            timeout_secs: None,
        }
    }
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("session_url", &self.session_url)
            .field("server_name", &self.server_name)
            .field("server_secret", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_directory_url() -> String {
    "http://localhost:9507".to_string()
}

fn default_session_url() -> String {
    "http://localhost:9107".to_string()
}

fn default_server_name() -> String {
    "gatekeeper".to_string()
}

fn default_server_secret() -> String {
    DEFAULT_SERVER_SECRET.to_string()
}

/// Fact refresh section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    /// Attempts per refresh run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff unit in seconds; retry `n` waits `n` units.
    #[serde(default = "default_backoff_step")]
    pub backoff_step_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_secs: default_backoff_step(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_step() -> u64 {
    3
}

/// Policy bundle section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Directory or `.tar.gz` bundle. None uses the built-in rules.
    #[serde(default)]
    pub bundle_path: Option<String>,

    /// Abort on builtin errors during evaluation.
    #[serde(default)]
    pub strict: bool,
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include ANSI color codes in output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
