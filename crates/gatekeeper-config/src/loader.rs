//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConfigError, GatekeeperConfig};

/// Environment variables understood by earlier deployments of the service.
const LEGACY_VARS: [&str; 5] = [
    "SHORELINE_SECRET",
    "SERVER_SECRET",
    "SHORELINE_HOST",
    "PORTAL_API_HOST",
    "PORT",
];

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Legacy environment variables, if enabled
/// 4. Prefixed environment variables
///
/// # Example
///
/// ```no_run
/// use gatekeeper_config::ConfigLoader;
///
/// # fn main() -> Result<(), gatekeeper_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("gatekeeper.toml")?
///     .with_env_prefix("GATEKEEPER")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GatekeeperConfig,
    env_prefix: Option<String>,
    legacy_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatekeeperConfig::default(),
            env_prefix: None,
            legacy_env: false,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = GatekeeperConfig::default();
        self
    }

    /// Start with development preset configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use gatekeeper_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = GatekeeperConfig::development();
        self
    }

    /// Start with production preset configuration.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = GatekeeperConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| ConfigError::file(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use gatekeeper_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [server]
    ///     http_addr = "127.0.0.1:3000"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::UnsupportedFormat(format.to_string())),
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`, for
    /// example `GATEKEEPER__DIRECTORY__URL=http://portal:9507`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Also honor the unprefixed variables of earlier deployments.
    ///
    /// `SHORELINE_SECRET`, `SERVER_SECRET`, `SHORELINE_HOST`,
    /// `PORTAL_API_HOST` and `PORT`. Prefixed variables still win.
    #[must_use]
    pub fn with_legacy_env(mut self) -> Self {
        self.legacy_env = true;
        self
    }

    /// Load a `.env` file for environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::DotEnv(e.to_string())),
        }
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Environment variable parsing fails
    /// - Configuration validation fails
    pub fn load(mut self) -> Result<GatekeeperConfig, ConfigError> {
        if self.legacy_env {
            for key in LEGACY_VARS {
                if let Ok(value) = env::var(key) {
                    self.apply_legacy_var(key, &value)?;
                }
            }
        }

        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GatekeeperConfig {
        self.config
    }

    // Parse configuration file based on extension
    fn parse_file(content: &str, path: &Path) -> Result<GatekeeperConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    // Apply environment variable overrides
    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    // Apply one unprefixed variable from earlier deployments
    fn apply_legacy_var(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() {
            return Ok(());
        }
        match key {
            "SHORELINE_SECRET" => self.config.auth.token_secret = value.to_string(),
            "SERVER_SECRET" => self.config.directory.server_secret = value.to_string(),
            "SHORELINE_HOST" => self.config.directory.session_url = value.to_string(),
            "PORTAL_API_HOST" if value.starts_with("http") => {
                self.config.directory.url = value.to_string();
            }
            "PORT" => {
                let port: u16 = value
                    .parse()
                    .ok()
                    .filter(|port| *port >= 80)
                    .ok_or_else(|| ConfigError::env(key, "expected a port >= 80"))?;
                self.config.server.http_addr = format!("0.0.0.0:{port}");
            }
            _ => {}
        }
        Ok(())
    }

    // Apply a single environment variable
    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            // Server section
            ["SERVER", "HTTP_ADDR"] => {
                self.config.server.http_addr = value.to_string();
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                self.config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                self.config.server.request_timeout_ms = parse_number(key, value)?;
            }

            // Auth section
            ["AUTH", "TOKEN_SECRET"] => {
                self.config.auth.token_secret = value.to_string();
            }
            ["AUTH", "SESSION_HEADER"] => {
                self.config.auth.session_header = value.to_lowercase();
            }

            // Directory section
            ["DIRECTORY", "URL"] => {
                self.config.directory.url = value.to_string();
            }
            ["DIRECTORY", "SESSION_URL"] => {
                self.config.directory.session_url = value.to_string();
            }
            ["DIRECTORY", "SERVER_NAME"] => {
                self.config.directory.server_name = value.to_string();
            }
            ["DIRECTORY", "SERVER_SECRET"] => {
                self.config.directory.server_secret = value.to_string();
            }
            ["DIRECTORY", "TIMEOUT_SECS"] => {
                self.config.directory.timeout_secs =
                    if value.is_empty() || value.eq_ignore_ascii_case("none") {
                        None
                    } else {
                        Some(parse_number(key, value)?)
                    };
            }

            // Refresh section
            ["REFRESH", "MAX_ATTEMPTS"] => {
                self.config.refresh.max_attempts = parse_number(key, value)?;
            }
            ["REFRESH", "BACKOFF_STEP_SECS"] => {
                self.config.refresh.backoff_step_secs = parse_number(key, value)?;
            }

            // Policy section
            ["POLICY", "BUNDLE_PATH"] => {
                self.config.policy.bundle_path = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["POLICY", "STRICT"] => {
                self.config.policy.strict = parse_flag(key, value)?;
            }

            // Logging section
            ["LOGGING", "ENABLED"] => {
                self.config.logging.enabled = parse_flag(key, value)?;
            }
            ["LOGGING", "LEVEL"] => {
                self.config.logging.level = value.to_string();
            }
            ["LOGGING", "FORMAT"] => {
                self.config.logging.format = match value.to_lowercase().as_str() {
                    "json" => crate::LogFormat::Json,
                    "pretty" => crate::LogFormat::Pretty,
                    _ => return Err(ConfigError::env(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "ANSI_ENABLED"] => {
                self.config.logging.ansi_enabled = parse_flag(key, value)?;
            }
            ["LOGGING", "INCLUDE_LOCATION"] => {
                self.config.logging.include_location = parse_flag(key, value)?;
            }

            // Keys for other tools sharing the prefix.
            _ => {}
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env(key, format!("expected a number, got {value:?}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env(key, format!("expected a boolean, got {value:?}")))
}

/// Lenient boolean: true/false, 1/0, yes/no, on/off.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
