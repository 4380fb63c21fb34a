//! The decision service: caller gate, fact refresh and dispatch behind the
//! two privileged operations.

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_authz::{
    AuthzResult, BundleLoader, CallerGate, DecisionRequest, DecisionResult, DirectoryClient,
    DirectorySettings, DirectorySource, Dispatcher, EvaluatorConfig, FactStore, PolicyBundle,
    RefreshOutcome, RefreshPolicy, Refresher, RuleSet,
};
use gatekeeper_config::GatekeeperConfig;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::error::ServerResult;
use crate::shutdown::ShutdownSignal;

/// Composes the decision core into the service operations.
#[derive(Debug)]
pub struct DecisionService {
    gate: Arc<CallerGate>,
    dispatcher: Dispatcher,
    refresher: Refresher,
    rules: Arc<RuleSet>,
    shutdown: ShutdownSignal,
}

impl DecisionService {
    /// Assemble a service from already-built parts.
    pub fn new(
        rules: Arc<RuleSet>,
        source: Arc<dyn DirectorySource>,
        token_secret: &str,
        policy: RefreshPolicy,
        shutdown: ShutdownSignal,
    ) -> Self {
        let gate = Arc::new(CallerGate::new(token_secret));
        let store = Arc::new(FactStore::new());
        let dispatcher = Dispatcher::new(Arc::clone(&rules), Arc::clone(&store), Arc::clone(&gate));
        let refresher = Refresher::new(source, store, policy);

        Self {
            gate,
            dispatcher,
            refresher,
            rules,
            shutdown,
        }
    }

    /// Build the service from configuration.
    ///
    /// Loads and compiles the policy bundle; any failure here is fatal.
    pub async fn from_config(config: &GatekeeperConfig, shutdown: ShutdownSignal) -> ServerResult<Self> {
        let bundle = match &config.policy.bundle_path {
            Some(path) => BundleLoader::from_path(path).await?,
            None => PolicyBundle::builtin(),
        };
        let evaluator = EvaluatorConfig::new().with_strict_mode(config.policy.strict);
        let rules = Arc::new(RuleSet::compile(&bundle, evaluator)?);
        info!(
            revision = rules.revision(),
            routes = rules.routed_modules().count(),
            "compiled policy bundle"
        );

        let client = DirectoryClient::new(directory_settings(config))?;
        let policy = RefreshPolicy {
            max_attempts: config.refresh.max_attempts,
            backoff_step: Duration::from_secs(config.refresh.backoff_step_secs),
        };

        Ok(Self::new(
            rules,
            Arc::new(client),
            &config.auth.token_secret,
            policy,
            shutdown,
        ))
    }

    /// Spawn the initial fact refresh.
    ///
    /// Decisions are served from the empty snapshot until it lands.
    pub fn start(&self) -> JoinHandle<RefreshOutcome> {
        info!(
            facts_version = self.refresher.store().current().version(),
            "starting initial fact refresh"
        );
        self.refresher.spawn(self.shutdown.recv())
    }

    /// Trigger a background fact refresh on behalf of a server caller.
    ///
    /// Returns as soon as the refresh is spawned; callers may drop the handle.
    #[instrument(skip_all)]
    pub fn request_groups_refresh(&self, token: &str) -> AuthzResult<JoinHandle<RefreshOutcome>> {
        let claims = self.gate.authorize_server(token)?;
        info!(caller = %claims.subject_id, "groups refresh requested");
        Ok(self.refresher.spawn(self.shutdown.recv()))
    }

    /// Decide a request on behalf of a server caller.
    #[instrument(skip_all)]
    pub fn evaluate_access(&self, token: &str, body: &[u8]) -> AuthzResult<DecisionResult> {
        self.gate.authorize_server(token)?;
        let request = DecisionRequest::from_slice(body)?;
        self.dispatcher.decide(&request)
    }

    /// Abandon in-flight refreshes and stop the HTTP listener.
    pub fn shutdown(&self) {
        info!("decision service shutting down");
        self.shutdown.trigger();
    }

    /// The shutdown signal shared with the HTTP server.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// The compiled rule set.
    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// The fact store decisions read from.
    pub fn facts(&self) -> &Arc<FactStore> {
        self.refresher.store()
    }
}

fn directory_settings(config: &GatekeeperConfig) -> DirectorySettings {
    DirectorySettings {
        directory_url: config.directory.url.clone(),
        session_url: config.directory.session_url.clone(),
        server_name: config.directory.server_name.clone(),
        server_secret: config.directory.server_secret.clone(),
        timeout: config.directory.timeout_secs.map(Duration::from_secs),
    }
}
