//! Main configuration types.
//!
//! This module provides the top-level [`GatekeeperConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{
    AuthConfig, DirectoryConfig, LoggingConfig, PolicyConfig, RefreshConfig, ServerConfig,
};

/// Complete Gatekeeper configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use gatekeeper_config::GatekeeperConfig;
///
/// let config = GatekeeperConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:9123");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct GatekeeperConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Caller authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upstream directory.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Fact refresh schedule.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Policy bundle source.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GatekeeperConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> GatekeeperConfigBuilder {
        GatekeeperConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - Server address is invalid
    /// - Directory or session URL is not http(s)
    /// - Refresh attempts is zero
    /// - Token secret or session header is empty
    pub fn validate(&self) -> Result<(), crate::ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(crate::ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        for (field, url) in [
            ("directory.url", &self.directory.url),
            ("directory.session_url", &self.directory.session_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(crate::ConfigError::invalid_value(
                    field,
                    format!("expected an http(s) URL, got {url}"),
                ));
            }
        }

        if self.refresh.max_attempts == 0 {
            return Err(crate::ConfigError::invalid_value(
                "refresh.max_attempts",
                "must be at least 1",
            ));
        }

        if self.auth.token_secret.is_empty() {
            return Err(crate::ConfigError::missing_field("auth.token_secret"));
        }

        if self.auth.session_header.trim().is_empty() {
            return Err(crate::ConfigError::missing_field("auth.session_header"));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty, colored debug logs and a short refresh backoff.
    ///
    /// # Example
    ///
    /// ```
    /// use gatekeeper_config::GatekeeperConfig;
    ///
    /// let config = GatekeeperConfig::development();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.logging.level = "debug".to_string();
        config.logging.format = crate::LogFormat::Pretty;
        config.logging.ansi_enabled = true;
        config.logging.include_location = true;

        config.refresh.backoff_step_secs = 1;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON logs, strict evaluation, and no built-in secrets: both secrets
    /// must come from a file or the environment.
    ///
    /// # Example
    ///
    /// ```
    /// use gatekeeper_config::GatekeeperConfig;
    ///
    /// let config = GatekeeperConfig::production();
    /// assert_eq!(config.logging.format, gatekeeper_config::LogFormat::Json);
    /// assert!(config.validate().is_err());
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = crate::LogFormat::Json;
        config.logging.ansi_enabled = false;

        config.policy.strict = true;

        config.auth.token_secret = String::new();
        config.directory.server_secret = String::new();

        config
    }
}

/// Builder for [`GatekeeperConfig`].
#[derive(Debug, Default)]
pub struct GatekeeperConfigBuilder {
    server: Option<ServerConfig>,
    auth: Option<AuthConfig>,
    directory: Option<DirectoryConfig>,
    refresh: Option<RefreshConfig>,
    policy: Option<PolicyConfig>,
    logging: Option<LoggingConfig>,
}

impl GatekeeperConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the authentication configuration.
    #[must_use]
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set the directory configuration.
    #[must_use]
    pub fn directory(mut self, directory: DirectoryConfig) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the refresh configuration.
    #[must_use]
    pub fn refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Set the policy configuration.
    #[must_use]
    pub fn policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Set the logging configuration.
    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> GatekeeperConfig {
        GatekeeperConfig {
            server: self.server.unwrap_or_default(),
            auth: self.auth.unwrap_or_default(),
            directory: self.directory.unwrap_or_default(),
            refresh: self.refresh.unwrap_or_default(),
            policy: self.policy.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<GatekeeperConfig, crate::ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
