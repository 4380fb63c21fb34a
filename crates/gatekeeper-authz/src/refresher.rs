//! Background refresh of the fact snapshot.
//!
//! One run makes up to [`RefreshPolicy::max_attempts`] sequential fetches,
//! installs the first success into the [`FactStore`] and stops. On repeated
//! failure the previously installed snapshot stays in place.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::RefreshPolicy;
use crate::directory::DirectorySource;
use crate::error::AuthzResult;
use crate::facts::{FactSnapshot, FactStore};

/// How a refresh run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A snapshot was installed.
    Installed {
        /// Version assigned by the store.
        version: u64,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed.
    GaveUp {
        /// Attempts made.
        attempts: u32,
    },
    /// The run was cancelled by shutdown.
    Abandoned,
}

impl RefreshOutcome {
    /// Check if a snapshot was installed.
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }
}

/// Fetches directory facts and installs them into the store.
#[derive(Debug, Clone)]
pub struct Refresher {
    source: Arc<dyn DirectorySource>,
    store: Arc<FactStore>,
    policy: RefreshPolicy,
}

impl Refresher {
    /// Create a new refresher.
    pub fn new(source: Arc<dyn DirectorySource>, store: Arc<FactStore>, policy: RefreshPolicy) -> Self {
        Self {
            source,
            store,
            policy,
        }
    }

    /// The store this refresher installs into.
    pub fn store(&self) -> &Arc<FactStore> {
        &self.store
    }

    /// Fetch once and build a snapshot without installing it.
    pub async fn refresh_once(&self) -> AuthzResult<FactSnapshot> {
        let document = self.source.fetch().await?;
        FactSnapshot::from_document(document)
    }

    /// Run one retrying refresh to completion.
    #[instrument(skip(self), fields(max_attempts = self.policy.max_attempts))]
    pub async fn run_background(&self) -> RefreshOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.refresh_once().await {
                Ok(snapshot) => {
                    let version = self.store.install(snapshot);
                    metrics::counter!("gatekeeper_refresh_attempts_total", "result" => "success")
                        .increment(1);
                    info!(version, attempt, "installed fact snapshot");
                    return RefreshOutcome::Installed {
                        version,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    metrics::counter!("gatekeeper_refresh_attempts_total", "result" => "failure")
                        .increment(1);
                    warn!(attempt, error = %e, "fact refresh attempt failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        error!(
            attempts = max_attempts,
            version = self.store.current().version(),
            "giving up on fact refresh, keeping current snapshot"
        );
        RefreshOutcome::GaveUp {
            attempts: max_attempts,
        }
    }

    /// Spawn a refresh run that is abandoned when `shutdown` resolves.
    ///
    /// Returns immediately; the handle yields the run's outcome.
    pub fn spawn<S>(&self, shutdown: S) -> JoinHandle<RefreshOutcome>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let refresher = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                outcome = refresher.run_background() => outcome,
                () = shutdown => {
                    info!("fact refresh abandoned on shutdown");
                    RefreshOutcome::Abandoned
                }
            }
        })
    }
}
