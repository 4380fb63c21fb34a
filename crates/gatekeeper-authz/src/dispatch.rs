//! Dispatch of decision requests to rule modules.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, instrument};

use crate::error::{AuthzError, AuthzResult};
use crate::facts::FactStore;
use crate::gate::CallerGate;
use crate::route::query_name;
use crate::rules::RuleSet;

/// The request being authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetRequest {
    /// HTTP method of the target request.
    pub method: String,
    /// Path of the target request.
    pub path: String,
    /// Session token of the end user making the target request.
    pub token: String,
}

/// Body of an is-allowed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequest {
    /// Users whose data is targeted; absent or empty means the caller's own.
    #[serde(rename = "userIds", default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    /// Target request.
    pub request: TargetRequest,
}

impl DecisionRequest {
    /// Decode a request body, rejecting unknown fields at every level.
    pub fn from_slice(body: &[u8]) -> AuthzResult<Self> {
        serde_json::from_slice(body).map_err(|e| AuthzError::bad_request(e.to_string()))
    }

    /// Target user ids, empty for self access.
    pub fn target_user_ids(&self) -> &[String] {
        self.user_ids.as_deref().unwrap_or_default()
    }
}

/// Context attached to every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Query name derived from the target request.
    pub query: String,
    /// Rule set revision.
    pub revision: String,
    /// Fact snapshot version.
    pub facts_version: u64,
    /// Whether the query resolved to a document.
    pub defined: bool,
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Overall verdict; true if any target is allowed.
    pub allow: bool,
    /// Verdict per target, present only when targets were given.
    #[serde(rename = "results", default, skip_serializing_if = "Option::is_none")]
    pub per_user: Option<BTreeMap<String, bool>>,
    /// Evaluation context.
    pub diagnostics: Diagnostics,
}

/// Convert a raw decision document into a [`DecisionResult`].
///
/// `None` (undefined document) denies every target. A defined document must
/// be an object with a boolean `allow` and an optional `results` object of
/// booleans; anything else is an evaluation error.
pub fn decision_from_value(
    raw: Option<Value>,
    targets: &[String],
    diagnostics: Diagnostics,
) -> AuthzResult<DecisionResult> {
    let unexpected = |what: &str| AuthzError::evaluation(&diagnostics.query, what.to_string());

    let (allow, results) = match raw {
        None => (false, BTreeMap::new()),
        Some(Value::Object(mut document)) => {
            let allow = match document.remove("allow") {
                Some(Value::Bool(allow)) => allow,
                Some(_) => return Err(unexpected("`allow` is not a boolean")),
                None => return Err(unexpected("decision has no `allow`")),
            };
            let results = match document.remove("results") {
                None | Some(Value::Null) => BTreeMap::new(),
                Some(Value::Object(entries)) => entries
                    .into_iter()
                    .map(|(user, verdict)| match verdict {
                        Value::Bool(b) => Ok((user, b)),
                        _ => Err(unexpected("`results` holds a non-boolean")),
                    })
                    .collect::<AuthzResult<BTreeMap<_, _>>>()?,
                Some(_) => return Err(unexpected("`results` is not an object")),
            };
            (allow, results)
        }
        Some(_) => return Err(unexpected("decision is not an object")),
    };

    let per_user = (!targets.is_empty()).then(|| {
        targets
            .iter()
            .map(|user| (user.clone(), results.get(user).copied().unwrap_or(false)))
            .collect()
    });

    Ok(DecisionResult {
        allow,
        per_user,
        diagnostics,
    })
}

/// Maps decision requests to rule modules and evaluates them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    rules: Arc<RuleSet>,
    facts: Arc<FactStore>,
    gate: Arc<CallerGate>,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(rules: Arc<RuleSet>, facts: Arc<FactStore>, gate: Arc<CallerGate>) -> Self {
        Self { rules, facts, gate }
    }

    /// Decide a request. Evaluation failures fail closed as `Forbidden`.
    #[instrument(skip_all, fields(
        method = %request.request.method,
        path = %request.request.path,
        query = tracing::field::Empty,
    ))]
    pub fn decide(&self, request: &DecisionRequest) -> AuthzResult<DecisionResult> {
        let query = query_name(&request.request.method, &request.request.path);
        tracing::Span::current().record("query", query.as_str());

        let snapshot = self.facts.current();
        let input = self.build_input(request);
        let diagnostics = Diagnostics {
            query: query.clone(),
            revision: self.rules.revision().to_string(),
            facts_version: snapshot.version(),
            defined: false,
        };

        let outcome = self
            .rules
            .evaluate(&query, &input, &snapshot)
            .and_then(|raw| {
                let defined = raw.is_some();
                decision_from_value(
                    raw,
                    request.target_user_ids(),
                    Diagnostics {
                        defined,
                        ..diagnostics
                    },
                )
            });

        match outcome {
            Ok(result) => {
                let label = if result.allow { "allow" } else { "deny" };
                metrics::counter!("gatekeeper_decisions_total", "outcome" => label).increment(1);
                debug!(
                    allow = result.allow,
                    defined = result.diagnostics.defined,
                    facts_version = result.diagnostics.facts_version,
                    "decision evaluated"
                );
                Ok(result)
            }
            Err(e) => {
                metrics::counter!("gatekeeper_decisions_total", "outcome" => "error").increment(1);
                error!(error = %e, "decision evaluation failed");
                Err(AuthzError::Forbidden)
            }
        }
    }

    fn build_input(&self, request: &DecisionRequest) -> Value {
        let mut input = Map::new();
        input.insert(
            "request".to_string(),
            json!({
                "method": request.request.method,
                "path": request.request.path,
                "token": request.request.token,
            }),
        );

        let targets = request.target_user_ids();
        if !targets.is_empty() {
            input.insert("userIds".to_string(), json!(targets));
        }

        if !request.request.token.is_empty() {
            match self.gate.authorize(&request.request.token) {
                Ok(claims) => {
                    input.insert("claims".to_string(), claims.to_policy_input());
                }
                Err(_) => debug!("target request token did not verify, evaluating without claims"),
            }
        }

        Value::Object(input)
    }
}
