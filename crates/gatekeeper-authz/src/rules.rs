//! Compiled rule set backed by the `regorus` engine.
//!
//! Every module of a [`PolicyBundle`] is compiled into one engine at startup.
//! Compilation is all-or-nothing: a single bad module, package mismatch or
//! route conflict fails the whole set, and the service must not start.
//! Facts are loaded into a clone of the compiled engine once per snapshot;
//! each evaluation clones that prepared engine, so any number of
//! evaluations can run at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use regorus::Engine;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::bundle::{package_name, PolicyBundle};
use crate::config::EvaluatorConfig;
use crate::error::{AuthzError, AuthzResult};
use crate::facts::FactSnapshot;
use crate::route::{query_text, Route};

/// Engine holding one snapshot's facts.
#[derive(Debug)]
struct Prepared {
    snapshot: Arc<FactSnapshot>,
    engine: Engine,
}

/// Compiled, read-only collection of rule modules.
#[derive(Debug)]
pub struct RuleSet {
    engine: Mutex<Engine>,
    prepared: Mutex<Option<Prepared>>,
    config: EvaluatorConfig,
    revision: String,
    routes: BTreeMap<String, Route>,
}

impl RuleSet {
    /// Compile every module of the bundle.
    #[instrument(skip_all, fields(revision = %bundle.metadata.revision))]
    pub fn compile(bundle: &PolicyBundle, config: EvaluatorConfig) -> AuthzResult<Self> {
        let mut engine = Engine::new();
        if config.strict_mode {
            engine.set_strict_builtin_errors(true);
        }

        let mut routes: BTreeMap<String, Route> = BTreeMap::new();
        for module in &bundle.modules {
            match package_name(&module.source) {
                Some(package) if package == module.name => {}
                Some(package) => {
                    return Err(AuthzError::compilation(
                        &module.name,
                        format!("declares package {package}"),
                    ));
                }
                None => return Err(AuthzError::compilation(&module.name, "declares no package")),
            }

            if let Some(route) = &module.route {
                let derived = route.query_name();
                if derived != module.name {
                    return Err(AuthzError::compilation(
                        &module.name,
                        format!(
                            "route {} {} dispatches to {derived}",
                            route.method, route.path
                        ),
                    ));
                }
                if let Some(other) = routes.values().find(|r| *r == route) {
                    return Err(AuthzError::compilation(
                        &module.name,
                        format!("route {} {} is already bound", other.method, other.path),
                    ));
                }
                routes.insert(module.name.clone(), route.clone());
            }

            debug!(module = %module.name, "adding rule module");
            engine
                .add_policy(format!("{}.rego", module.name), module.source.clone())
                .map_err(|e| AuthzError::compilation(&module.name, e.to_string()))?;
        }

        let rule_set = Self {
            engine: Mutex::new(engine),
            prepared: Mutex::new(None),
            config,
            revision: bundle.metadata.revision.clone(),
            routes,
        };

        let probe = Arc::new(FactSnapshot::empty());
        for name in rule_set.routes.keys() {
            let value = rule_set
                .evaluate(name, &Value::Object(serde_json::Map::new()), &probe)
                .map_err(|e| AuthzError::compilation(name, e.to_string()))?;
            if value.is_none() {
                return Err(AuthzError::compilation(
                    name,
                    format!("does not define `{}`", rule_set.config.decision_rule),
                ));
            }
        }

        info!(
            modules = bundle.modules.len(),
            routes = rule_set.routes.len(),
            "rule set compiled"
        );
        Ok(rule_set)
    }

    /// Evaluate the decision rule of module `name`.
    ///
    /// Returns `Ok(None)` when the document is undefined, which is the case
    /// for any name that matches no module.
    pub fn evaluate(
        &self,
        name: &str,
        input: &Value,
        snapshot: &Arc<FactSnapshot>,
    ) -> AuthzResult<Option<Value>> {
        let query = query_text(name, &self.config.decision_rule);

        let mut engine = self.engine_for(name, snapshot)?;
        engine.set_input(input.clone().into());

        let results = engine
            .eval_query(query, false)
            .map_err(|e| AuthzError::evaluation(name, e.to_string()))?;

        let value = results
            .result
            .into_iter()
            .next()
            .and_then(|r| r.expressions.into_iter().next())
            .map(|expr| expr.value);

        match value {
            None | Some(regorus::Value::Undefined) => Ok(None),
            Some(value) => serde_json::to_value(&value)
                .map(Some)
                .map_err(|e| AuthzError::evaluation(name, format!("unrepresentable result: {e}"))),
        }
    }

    /// An engine with `snapshot` loaded, reusing the last prepared one when
    /// it was built from the same snapshot.
    fn engine_for(&self, name: &str, snapshot: &Arc<FactSnapshot>) -> AuthzResult<Engine> {
        if let Some(prepared) = self.prepared.lock().as_ref() {
            if Arc::ptr_eq(&prepared.snapshot, snapshot) {
                return Ok(prepared.engine.clone());
            }
        }

        let mut engine = self.engine.lock().clone();
        engine
            .add_data(snapshot.policy_data().clone())
            .map_err(|e| AuthzError::evaluation(name, format!("failed to add facts: {e}")))?;
        debug!(facts_version = snapshot.version(), "prepared engine for fact snapshot");

        *self.prepared.lock() = Some(Prepared {
            snapshot: Arc::clone(snapshot),
            engine: engine.clone(),
        });
        Ok(engine)
    }

    /// Revision of the bundle this set was compiled from.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Route bound to a module, if any.
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    /// All routed module names.
    pub fn routed_modules(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::RuleModule;
    use crate::facts::{DirectoryDocument, FactStore, UserFacts};
    use serde_json::json;

    const PEOPLE: &str = r#"
package get.people

import rego.v1

decision := {"allow": count(data.users) > 0, "results": {}}
"#;

    const PING: &str = r#"
package get.ping

import rego.v1

default allow := false

allow if input.request.path == "/ping"

decision := {"allow": allow, "results": {}}
"#;

    fn ping_bundle() -> PolicyBundle {
        PolicyBundle::new("test").with_module(RuleModule::routed(
            "get.ping",
            PING,
            Route::new("GET", "/ping"),
        ))
    }

    #[test]
    fn test_compile_builtin() {
        let rules = RuleSet::compile(&PolicyBundle::builtin(), EvaluatorConfig::default()).unwrap();
        assert!(rules.route("get.data.v1.ranges").is_some());
        assert!(rules.revision().starts_with("builtin-"));
    }

    #[test]
    fn test_evaluate_defined_and_undefined() {
        let rules = RuleSet::compile(&ping_bundle(), EvaluatorConfig::default()).unwrap();
        let snapshot = Arc::new(FactSnapshot::empty());
        let input = json!({"request": {"method": "GET", "path": "/ping", "token": "t"}});

        let value = rules.evaluate("get.ping", &input, &snapshot).unwrap().unwrap();
        assert_eq!(value["allow"], json!(true));

        assert!(rules.evaluate("get.nothing", &input, &snapshot).unwrap().is_none());
    }

    #[test]
    fn test_builtin_resolves_common_library() {
        let rules = RuleSet::compile(
            &PolicyBundle::builtin(),
            EvaluatorConfig::new().with_strict_mode(true),
        )
        .unwrap();
        let input = json!({
            "request": {"method": "GET", "path": "/data/v1/ranges", "token": "t"},
            "claims": {"svr": "no", "usr": "pA", "roles": ["patient"]}
        });

        let value = rules
            .evaluate("get.data.v1.ranges", &input, &Arc::new(FactSnapshot::empty()))
            .unwrap()
            .unwrap();
        assert_eq!(value["allow"], json!(true));
    }

    #[test]
    fn test_prepared_engine_follows_snapshot() {
        let bundle = PolicyBundle::new("test").with_module(RuleModule::routed(
            "get.people",
            PEOPLE,
            Route::new("GET", "/people"),
        ));
        let rules = RuleSet::compile(&bundle, EvaluatorConfig::default()).unwrap();
        let store = FactStore::new();
        let input = json!({});

        let before = store.current();
        let value = rules.evaluate("get.people", &input, &before).unwrap().unwrap();
        assert_eq!(value["allow"], json!(false));
        let again = rules.evaluate("get.people", &input, &before).unwrap().unwrap();
        assert_eq!(again, value);

        let mut doc = DirectoryDocument::default();
        doc.users.insert("u1".to_string(), UserFacts::default());
        store.install(FactSnapshot::from_document(doc).unwrap());

        let value = rules
            .evaluate("get.people", &input, &store.current())
            .unwrap()
            .unwrap();
        assert_eq!(value["allow"], json!(true));

        // An older snapshot still sees its own facts.
        let value = rules.evaluate("get.people", &input, &before).unwrap().unwrap();
        assert_eq!(value["allow"], json!(false));
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let bundle = PolicyBundle::new("bad").with_module(RuleModule::routed(
            "get.ping",
            "package get.ping\n\nallow if {",
            Route::new("GET", "/ping"),
        ));
        let err = RuleSet::compile(&bundle, EvaluatorConfig::default()).unwrap_err();
        assert!(err.is_compilation());
    }

    #[test]
    fn test_package_mismatch_is_fatal() {
        let bundle = PolicyBundle::new("bad").with_module(RuleModule::library(
            "common",
            "package other\n",
        ));
        let err = RuleSet::compile(&bundle, EvaluatorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("declares package other"));
    }

    #[test]
    fn test_inconsistent_route_is_fatal() {
        let bundle = PolicyBundle::new("bad").with_module(RuleModule::routed(
            "get.ping",
            PING,
            Route::new("POST", "/ping"),
        ));
        let err = RuleSet::compile(&bundle, EvaluatorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("dispatches to post.ping"));
    }

    #[test]
    fn test_missing_decision_is_fatal() {
        let bundle = PolicyBundle::new("bad").with_module(RuleModule::routed(
            "get.ping",
            "package get.ping\n\nimport rego.v1\n\nallow := true\n",
            Route::new("GET", "/ping"),
        ));
        let err = RuleSet::compile(&bundle, EvaluatorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("does not define `decision`"));
    }
}
