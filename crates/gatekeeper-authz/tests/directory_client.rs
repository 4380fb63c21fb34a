//! Directory client and refresher against a mocked directory.

use std::sync::Arc;
use std::time::Duration;

use gatekeeper_authz::{
    AuthzError, DirectoryClient, DirectorySettings, DirectorySource, FactStore,
    RefreshOutcome, RefreshPolicy, Refresher,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> DirectorySettings {
    DirectorySettings {
        directory_url: server.uri(),
        session_url: server.uri(),
        server_name: "gatekeeper".to_string(),
        server_secret: "s3cret".to_string(),
        timeout: Some(Duration::from_secs(2)),
    }
}

fn directory_body() -> serde_json::Value {
    json!({
        "users": {
            "pA": {"roles": ["patient"], "groups": [{"id": "g1", "role": "patient"}]},
            "hcp": {"roles": ["clinic"], "groups": [{"id": "g1", "role": "admin"}]}
        },
        "groups": {"g1": {"group": "clinic"}}
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/serverlogin"))
        .and(header("x-tidepool-server-name", "gatekeeper"))
        .and(header("x-tidepool-server-secret", "s3cret"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-tidepool-session-token", "svc-token"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_logs_in_and_downloads() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/v1/team/opa"))
        .and(header("x-tidepool-session-token", "svc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(directory_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = DirectoryClient::new(settings(&server)).unwrap();
    let document = client.fetch().await.unwrap();

    assert_eq!(document.users.len(), 2);
    assert!(document.users["pA"].roles.contains("patient"));
    assert_eq!(document.groups["g1"].group, "clinic");
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/serverlogin"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = DirectoryClient::new(settings(&server)).unwrap();
    let err = client.fetch().await.unwrap_err();
    assert!(matches!(err, AuthzError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn test_login_without_token_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/serverlogin"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = DirectoryClient::new(settings(&server)).unwrap();
    let err = client.server_login().await.unwrap_err();
    assert!(err.to_string().contains("no session token"));
}

#[tokio::test]
async fn test_directory_error_status() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/v1/team/opa"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = DirectoryClient::new(settings(&server)).unwrap();
    let err = client.fetch().await.unwrap_err();
    assert!(matches!(err, AuthzError::UpstreamUnavailable(_)));
}

#[tokio::test]
async fn test_undecodable_document() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/v1/team/opa"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = DirectoryClient::new(settings(&server)).unwrap();
    let err = client.fetch().await.unwrap_err();
    assert!(err.to_string().contains("undecodable"));
}

#[tokio::test]
async fn test_refresher_installs_from_directory() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/v1/team/opa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(directory_body()))
        .mount(&server)
        .await;

    let store = Arc::new(FactStore::new());
    let source = Arc::new(DirectoryClient::new(settings(&server)).unwrap());
    let refresher = Refresher::new(source, Arc::clone(&store), RefreshPolicy::default());

    let outcome = refresher.spawn(std::future::pending()).await.unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Installed {
            version: 1,
            attempts: 1
        }
    );
    assert_eq!(store.current().users().len(), 2);
}

#[tokio::test]
async fn test_refresher_gives_up_on_unreachable_directory() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/teams/v1/team/opa"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let store = Arc::new(FactStore::new());
    let source = Arc::new(DirectoryClient::new(settings(&server)).unwrap());
    let policy = RefreshPolicy {
        max_attempts: 4,
        backoff_step: Duration::from_millis(5),
    };
    let refresher = Refresher::new(source, Arc::clone(&store), policy);

    assert_eq!(
        refresher.run_background().await,
        RefreshOutcome::GaveUp { attempts: 4 }
    );
    assert_eq!(store.current().version(), 0);
}
