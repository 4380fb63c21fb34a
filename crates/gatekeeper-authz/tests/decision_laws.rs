//! End-to-end decisions with the built-in rule table.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use gatekeeper_authz::{
    CallerGate, DecisionRequest, DirectoryDocument, Dispatcher, EvaluatorConfig, FactSnapshot,
    FactStore, GroupMembership, PolicyBundle, RuleSet, TargetRequest, UserFacts,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use proptest::prelude::*;
use serde_json::json;

const SECRET: &str = "decision-laws-secret";

fn rules() -> Arc<RuleSet> {
    static RULES: OnceLock<Arc<RuleSet>> = OnceLock::new();
    Arc::clone(RULES.get_or_init(|| {
        Arc::new(RuleSet::compile(&PolicyBundle::builtin(), EvaluatorConfig::default()).unwrap())
    }))
}

fn token(user: &str, svr: &str, roles: &[&str]) -> String {
    let claims = json!({
        "svr": svr,
        "usr": user,
        "roles": roles,
        "exp": Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn user(roles: &[&str], groups: &[&str]) -> UserFacts {
    UserFacts {
        roles: roles.iter().map(ToString::to_string).collect(),
        groups: groups
            .iter()
            .map(|id| GroupMembership {
                id: (*id).to_string(),
                role: "member".to_string(),
            })
            .collect(),
    }
}

fn dispatcher(users: &[(&str, UserFacts)]) -> Dispatcher {
    let mut document = DirectoryDocument::default();
    for (id, facts) in users {
        document.users.insert((*id).to_string(), facts.clone());
    }
    let store = Arc::new(FactStore::new());
    store.install(FactSnapshot::from_document(document).unwrap());
    Dispatcher::new(rules(), store, Arc::new(CallerGate::new(SECRET)))
}

fn clinic() -> Dispatcher {
    dispatcher(&[
        ("hcp", user(&["clinic"], &["g1"])),
        ("pA", user(&["patient"], &["g1"])),
        ("pB", user(&["patient"], &["g2"])),
        ("pC", user(&["clinic"], &["g1"])),
        ("self", user(&["patient"], &[])),
    ])
}

fn request(method: &str, path: &str, token: String, targets: &[&str]) -> DecisionRequest {
    DecisionRequest {
        user_ids: (!targets.is_empty())
            .then(|| targets.iter().map(ToString::to_string).collect()),
        request: TargetRequest {
            method: method.to_string(),
            path: path.to_string(),
            token,
        },
    }
}

fn ranges(token: String, targets: &[&str]) -> DecisionRequest {
    request("GET", "/data/v1/ranges", token, targets)
}

#[test]
fn test_self_access_patient_allowed() {
    let result = clinic()
        .decide(&ranges(token("self", "no", &["patient"]), &[]))
        .unwrap();
    assert!(result.allow);
    assert!(result.per_user.is_none());
    assert!(result.diagnostics.defined);
    assert_eq!(result.diagnostics.query, "get.data.v1.ranges");
    assert_eq!(result.diagnostics.facts_version, 1);
}

#[test]
fn test_self_access_clinic_denied() {
    let result = clinic()
        .decide(&ranges(token("hcp", "no", &["clinic"]), &[]))
        .unwrap();
    assert!(!result.allow);
}

#[test]
fn test_self_access_server_token_denied() {
    let result = clinic()
        .decide(&ranges(token("svc", "yes", &["patient"]), &[]))
        .unwrap();
    assert!(!result.allow);
}

#[test]
fn test_disjunction_true_false() {
    let result = clinic()
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["pA", "pB"]))
        .unwrap();
    let per_user = result.per_user.unwrap();
    assert!(per_user["pA"]);
    assert!(!per_user["pB"]);
    assert!(result.allow);
}

#[test]
fn test_disjunction_false_false() {
    let result = clinic()
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["pB", "pC"]))
        .unwrap();
    let per_user = result.per_user.unwrap();
    assert!(!per_user["pB"]);
    assert!(!per_user["pC"]);
    assert!(!result.allow);
}

#[test]
fn test_disjunction_true_true() {
    let d = dispatcher(&[
        ("hcp", user(&["clinic"], &["g1", "g2"])),
        ("pA", user(&["patient"], &["g1"])),
        ("pB", user(&["patient"], &["g2"])),
    ]);
    let result = d
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["pA", "pB"]))
        .unwrap();
    assert!(result.per_user.unwrap().values().all(|v| *v));
    assert!(result.allow);
}

#[test]
fn test_shared_group_requires_patient_role() {
    let result = clinic()
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["pC"]))
        .unwrap();
    assert!(!result.allow);
}

#[test]
fn test_unknown_target_denied() {
    let result = clinic()
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["ghost"]))
        .unwrap();
    assert_eq!(result.per_user.unwrap()["ghost"], false);
    assert!(!result.allow);
}

#[test]
fn test_unverified_inner_token_denies() {
    let result = clinic()
        .decide(&ranges("garbage".to_string(), &["pA"]))
        .unwrap();
    assert!(!result.allow);

    let result = clinic().decide(&ranges(String::new(), &[])).unwrap();
    assert!(!result.allow);
}

#[test]
fn test_unrelated_route_denies_without_error() {
    let d = clinic();
    let result = d
        .decide(&request("GET", "/data/v2/other", token("self", "no", &["patient"]), &[]))
        .unwrap();
    assert!(!result.allow);
    assert!(!result.diagnostics.defined);

    let result = d
        .decide(&request("POST", "/data/v1/ranges", token("self", "no", &["patient"]), &[]))
        .unwrap();
    assert!(!result.allow);
    assert_eq!(result.diagnostics.query, "post.data.v1.ranges");
}

#[test]
fn test_colliding_path_guarded() {
    let result = clinic()
        .decide(&request("GET", "/data/v1.ranges", token("self", "no", &["patient"]), &[]))
        .unwrap();
    assert_eq!(result.diagnostics.query, "get.data.v1.ranges");
    assert!(result.diagnostics.defined);
    assert!(!result.allow);
}

#[test]
fn test_bootstrap_snapshot_denies_targets() {
    let d = Dispatcher::new(
        rules(),
        Arc::new(FactStore::new()),
        Arc::new(CallerGate::new(SECRET)),
    );
    let result = d
        .decide(&ranges(token("hcp", "no", &["clinic"]), &["pA"]))
        .unwrap();
    assert!(!result.allow);
    assert_eq!(result.diagnostics.facts_version, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_allow_is_disjunction(
        a_shared in any::<bool>(),
        b_shared in any::<bool>(),
        a_patient in any::<bool>(),
        b_patient in any::<bool>(),
    ) {
        let role = |patient: bool| if patient { "patient" } else { "clinic" };
        let group = |shared: bool, own: &'static str| if shared { "g1" } else { own };
        let d = dispatcher(&[
            ("hcp", user(&["clinic"], &["g1"])),
            ("a", user(&[role(a_patient)], &[group(a_shared, "ga")])),
            ("b", user(&[role(b_patient)], &[group(b_shared, "gb")])),
        ]);

        let result = d.decide(&ranges(token("hcp", "no", &["clinic"]), &["a", "b"])).unwrap();
        let per_user = result.per_user.unwrap();
        prop_assert_eq!(per_user["a"], a_shared && a_patient);
        prop_assert_eq!(per_user["b"], b_shared && b_patient);
        prop_assert_eq!(result.allow, per_user["a"] || per_user["b"]);
    }
}
