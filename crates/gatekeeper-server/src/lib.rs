//! Gatekeeper Server - HTTP binding for the authorization decision service
//!
//! Wires the decision core from `gatekeeper-authz` behind three HTTP routes
//! and provides the `gatekeeper` binary.
//!
//! # Endpoints
//!
//! | Route                          | Caller  | Response                                  |
//! |--------------------------------|---------|-------------------------------------------|
//! | `PUT /authz/v1/is-allowed`     | server  | 200 allow, 401 deny, 400, 403             |
//! | `POST /authz/v1/groups-update` | server  | 202 `Accepted`, 403                       |
//! | `GET /status`                  | anyone  | 200 `{"status":"OK","version":...}`       |
//!
//! Anything else is a 404. Privileged routes require a server session token
//! in the configured session header (`x-tidepool-session-token` by default).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gatekeeper_config::GatekeeperConfig;
//! use gatekeeper_server::{DecisionService, GatekeeperServer, HttpSettings, ShutdownSignal};
//!
//! let config = GatekeeperConfig::default();
//! let service = Arc::new(DecisionService::from_config(&config, ShutdownSignal::with_os_signals()).await?);
//! service.start();
//! GatekeeperServer::new(service, HttpSettings::from_config(&config)).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/gatekeeper-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod server;
pub mod service;
pub mod shutdown;

pub use error::{ErrorResponse, ServerError, ServerResult};
pub use server::{GatekeeperServer, HttpSettings};
pub use service::DecisionService;
pub use shutdown::{ConnectionTracker, ShutdownSignal};

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
