//! Integration tests against a mocked API server.

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use muster_connector::config::AuthConfig;
use muster_connector::scope::ScopeFilter;
use muster_connector::traits::Connector;
use muster_connector::types::AssetState;
use muster_connector_kubernetes::{KubernetesConfig, KubernetesConnector};
use muster_core::TenantId;

async fn mock_version(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "major": "1", "minor": "31", "gitVersion": "v1.31.2"
        })))
        .mount(server)
        .await;
}

fn config_for(server: &MockServer) -> KubernetesConfig {
    KubernetesConfig {
        api_server: server.uri(),
        cluster_name: "test-cluster".to_string(),
        auth: AuthConfig::None,
        namespaces: ScopeFilter::default(),
        connection: Default::default(),
        insecure_skip_tls_verify: false,
        discover_nodes: false,
        resolve_owners: true,
    }
}

fn namespace_list(names: &[&str]) -> serde_json::Value {
    json!({
        "items": names
            .iter()
            .map(|n| json!({"metadata": {"name": n, "uid": format!("ns-{n}")}}))
            .collect::<Vec<_>>()
    })
}

fn pod(namespace: &str, name: &str, uid: &str, phase: &str, image: &str) -> serde_json::Value {
    json!({
        "metadata": {"name": name, "uid": uid, "namespace": namespace},
        "spec": {"nodeName": "node-a", "containers": [{"name": "main", "image": image}]},
        "status": {"phase": phase}
    })
}

#[tokio::test]
async fn discovers_pods_across_namespaces() {
    let server = MockServer::start().await;
    mock_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(namespace_list(&["default", "payments"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/default/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [pod("default", "web-1", "uid-web-1", "Running", "nginx:1.27")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/payments/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                pod("payments", "api-1", "uid-api-1", "Running", "registry.example.com:5000/api:2.4.1"),
                pod("payments", "job-1", "uid-job-1", "Succeeded", "worker@sha256:abc123")
            ]
        })))
        .mount(&server)
        .await;

    let connector = KubernetesConnector::new(config_for(&server)).unwrap();
    connector.connect().await.unwrap();
    connector.health().await.unwrap();

    let cancel = CancellationToken::new();
    let discovery = connector
        .discover_assets(TenantId::new(), &cancel)
        .await
        .unwrap();

    assert_eq!(discovery.assets.len(), 3);
    assert!(discovery.scope_failures.is_empty());

    let api = discovery
        .assets
        .iter()
        .find(|a| a.instance_id == "uid-api-1")
        .unwrap();
    assert_eq!(api.region, "payments");
    assert_eq!(api.image_ref, "registry.example.com:5000/api");
    assert_eq!(api.image_version, "2.4.1");

    let job = discovery
        .assets
        .iter()
        .find(|a| a.instance_id == "uid-job-1")
        .unwrap();
    assert_eq!(job.state, AssetState::Terminated);
    assert_eq!(job.image_version, "sha256:abc123");
}

#[tokio::test]
async fn one_failing_namespace_does_not_fail_discovery() {
    let server = MockServer::start().await;
    mock_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(namespace_list(&[
            "default",
            "locked",
            "payments",
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/default/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [pod("default", "web-1", "uid-web-1", "Running", "nginx:1.27")]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/locked/pods"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/payments/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [pod("payments", "api-1", "uid-api-1", "Running", "api:1.0")]
        })))
        .mount(&server)
        .await;

    let connector = KubernetesConnector::new(config_for(&server)).unwrap();
    connector.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let discovery = connector
        .discover_assets(TenantId::new(), &cancel)
        .await
        .unwrap();

    // Both healthy namespaces still contributed.
    assert_eq!(discovery.assets.len(), 2);
    assert_eq!(discovery.scope_failures.len(), 1);
    assert_eq!(discovery.scope_failures[0].scope, "locked");
}

#[tokio::test]
async fn scope_filter_limits_namespaces() {
    let server = MockServer::start().await;
    mock_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(namespace_list(&[
            "default",
            "kube-system",
            "payments",
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/payments/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [pod("payments", "api-1", "uid-api-1", "Running", "api:1.0")]
        })))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.namespaces = ScopeFilter::default().with_include(["payments"]);
    let connector = KubernetesConnector::new(config).unwrap();
    connector.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let discovery = connector
        .discover_assets(TenantId::new(), &cancel)
        .await
        .unwrap();

    assert_eq!(discovery.assets.len(), 1);
    assert_eq!(discovery.assets[0].region, "payments");
}

#[tokio::test]
async fn cancelled_discovery_returns_promptly() {
    let server = MockServer::start().await;
    mock_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(namespace_list(&["default"])))
        .mount(&server)
        .await;

    let connector = KubernetesConnector::new(config_for(&server)).unwrap();
    connector.connect().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let discovery = connector
        .discover_assets(TenantId::new(), &cancel)
        .await
        .unwrap();

    // Cancelled before any namespace was enumerated.
    assert!(discovery.assets.is_empty());
    assert!(discovery.scope_failures.is_empty());
}

#[tokio::test]
async fn connect_fails_against_unreachable_server() {
    let config = KubernetesConfig {
        api_server: "https://127.0.0.1:1".to_string(),
        cluster_name: "down".to_string(),
        auth: AuthConfig::None,
        namespaces: ScopeFilter::default(),
        connection: Default::default(),
        insecure_skip_tls_verify: false,
        discover_nodes: false,
        resolve_owners: true,
    };
    let connector = KubernetesConnector::new(config).unwrap();
    assert!(connector.connect().await.is_err());
    // The session stays unusable.
    assert!(connector.health().await.is_err());
}

#[tokio::test]
async fn discover_images_deduplicates() {
    let server = MockServer::start().await;
    mock_version(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(namespace_list(&["default"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/default/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                pod("default", "web-1", "uid-1", "Running", "nginx:1.27"),
                pod("default", "web-2", "uid-2", "Running", "nginx:1.27"),
                pod("default", "api-1", "uid-3", "Running", "api:2.0")
            ]
        })))
        .mount(&server)
        .await;

    let connector = KubernetesConnector::new(config_for(&server)).unwrap();
    connector.connect().await.unwrap();

    let cancel = CancellationToken::new();
    let images = connector.discover_images(&cancel).await.unwrap();
    assert_eq!(images.len(), 2);
}
