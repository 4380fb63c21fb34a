//! Typed configuration for Gatekeeper.
//!
//! This crate provides a strongly-typed configuration for the Gatekeeper
//! authorization service with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Overview
//!
//! [`GatekeeperConfig`] holds every section:
//!
//! - [`ServerConfig`] - listen address and timeouts
//! - [`AuthConfig`] - token secret and session header
//! - [`DirectoryConfig`] - directory and session service endpoints
//! - [`RefreshConfig`] - fact refresh retry schedule
//! - [`PolicyConfig`] - policy bundle source
//! - [`LoggingConfig`] - log level and format
//!
//! # Example
//!
//! ```no_run
//! use gatekeeper_config::ConfigLoader;
//!
//! # fn main() -> Result<(), gatekeeper_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("gatekeeper.toml")?
//!     .with_env_prefix("GATEKEEPER")
//!     .load()?;
//!
//! println!("Listening on: {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:9123"
//!
//! [auth]
//! token_secret = "..."
//!
//! [directory]
//! url = "http://portal:9507"
//! session_url = "http://shoreline:9107"
//! server_secret = "..."
//!
//! [refresh]
//! max_attempts = 4
//! backoff_step_secs = 3
//!
//! [policy]
//! bundle_path = "/etc/gatekeeper/bundle.tar.gz"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables, e.g.
//! `GATEKEEPER__DIRECTORY__URL=http://portal:9507`.

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
