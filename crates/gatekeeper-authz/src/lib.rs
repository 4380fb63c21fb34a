//! Gatekeeper Authorization - policy decisions over directory facts
//!
//! This crate is the decision core of Gatekeeper. It answers "may this caller
//! perform this request on these users' data?" by evaluating Rego rule
//! modules against a periodically refreshed snapshot of the user/group graph.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────────┐   fetch    ┌──────────────────┐
//!   │ DirectoryClient  │◄───────────│    Refresher     │
//!   └──────────────────┘            └────────┬─────────┘
//!                                            │ install
//!                                   ┌────────▼─────────┐
//!                                   │    FactStore     │
//!                                   │    (ArcSwap)     │
//!                                   └────────┬─────────┘
//!   DecisionRequest                          │ current()
//!        │        ┌──────────────────┐  ┌────▼─────────┐
//!        └───────►│    Dispatcher    │─►│   RuleSet    │
//!                 │ (query name)     │  │  (regorus)   │
//!                 └────────┬─────────┘  └──────────────┘
//!                          ▼
//!                   DecisionResult
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatekeeper_authz::{CallerGate, DecisionRequest, Dispatcher, EvaluatorConfig,
//!     FactStore, PolicyBundle, RuleSet};
//!
//! let rules = Arc::new(RuleSet::compile(&PolicyBundle::builtin(), EvaluatorConfig::default())?);
//! let dispatcher = Dispatcher::new(rules, Arc::new(FactStore::new()), Arc::new(CallerGate::new("secret")));
//!
//! let request = DecisionRequest::from_slice(body)?;
//! let result = dispatcher.decide(&request)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bundle;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod facts;
pub mod gate;
pub mod refresher;
pub mod route;
pub mod rules;

// Re-exports for convenience
pub use bundle::{BundleLoader, BundleMetadata, PolicyBundle, RuleModule};
pub use config::{DirectorySettings, EvaluatorConfig, RefreshPolicy};
pub use directory::{DirectoryClient, DirectorySource};
pub use dispatch::{DecisionRequest, DecisionResult, Diagnostics, Dispatcher, TargetRequest};
pub use error::{AuthzError, AuthzResult};
pub use facts::{DirectoryDocument, FactSnapshot, FactStore, GroupFacts, GroupMembership, UserFacts};
pub use gate::{CallerGate, SessionClaims, SESSION_TOKEN_HEADER};
pub use refresher::{RefreshOutcome, Refresher};
pub use route::{query_name, Route};
pub use rules::RuleSet;
