//! Kubernetes connector.
//!
//! Talks to the API server over HTTPS and normalizes pods (and optionally
//! nodes) into canonical assets. Each namespace is one discovery scope: a
//! namespace that fails to list is recorded and skipped, the rest of the
//! cluster is still discovered.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use muster_connector::asset::{DiscoveredImage, NormalizedAsset};
use muster_connector::config::{AuthConfig, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::image::split_image_reference;
use muster_connector::traits::{Connector, Discovery};
use muster_connector::types::{AssetState, Platform, SessionState};
use muster_core::TenantId;

use crate::config::KubernetesConfig;

/// Connector for a single Kubernetes cluster.
pub struct KubernetesConnector {
    config: KubernetesConfig,
    display_name: String,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    client: Option<Client>,
}

impl std::fmt::Debug for KubernetesConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesConnector")
            .field("config", &self.config.redacted())
            .finish()
    }
}

// API server response shapes, limited to the fields discovery reads.

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "gitVersion")]
    git_version: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Namespace {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize, Default)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    uid: String,
    #[serde(default)]
    labels: std::collections::BTreeMap<String, String>,
    #[serde(rename = "ownerReferences", default)]
    owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Deserialize)]
struct OwnerReference {
    kind: String,
    name: String,
    #[serde(default)]
    controller: bool,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize, Default)]
struct PodSpec {
    #[serde(rename = "nodeName", default)]
    node_name: String,
    #[serde(default)]
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Deserialize)]
struct ContainerSpec {
    #[serde(default)]
    image: String,
}

#[derive(Debug, Deserialize, Default)]
struct PodStatus {
    #[serde(default)]
    phase: String,
}

#[derive(Debug, Deserialize)]
struct Node {
    metadata: ObjectMeta,
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Debug, Deserialize, Default)]
struct NodeStatus {
    #[serde(default)]
    conditions: Vec<NodeCondition>,
    #[serde(rename = "nodeInfo", default)]
    node_info: NodeInfo,
    #[serde(default)]
    capacity: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeCondition {
    #[serde(rename = "type")]
    condition_type: String,
    status: String,
}

#[derive(Debug, Deserialize, Default)]
struct NodeInfo {
    #[serde(rename = "osImage", default)]
    os_image: String,
    #[serde(rename = "kernelVersion", default)]
    kernel_version: String,
    #[serde(rename = "kubeletVersion", default)]
    kubelet_version: String,
}

/// Map a pod phase onto the canonical lifecycle.
///
/// `Succeeded` and `Failed` pods have finished running; both normalize to
/// `Terminated`. Anything outside the documented phase set is `Unknown`.
fn map_pod_phase(phase: &str) -> AssetState {
    match phase {
        "Running" => AssetState::Running,
        "Pending" => AssetState::Pending,
        "Succeeded" | "Failed" => AssetState::Terminated,
        "Unknown" => AssetState::Unknown,
        _ => AssetState::Unknown,
    }
}

/// Map a node's `Ready` condition onto the canonical lifecycle.
///
/// A node that is not Ready may be cordoned, partitioned, or powered off;
/// the API cannot tell these apart, so it maps to `Unknown` rather than
/// guessing `Stopped`.
fn map_node_ready(conditions: &[NodeCondition]) -> AssetState {
    match conditions
        .iter()
        .find(|c| c.condition_type == "Ready")
        .map(|c| c.status.as_str())
    {
        Some("True") => AssetState::Running,
        Some(_) => AssetState::Unknown,
        None => AssetState::Unknown,
    }
}

impl KubernetesConnector {
    /// Create a connector from validated configuration.
    pub fn new(config: KubernetesConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let display_name = format!("kubernetes: {}", config.cluster_name);
        Ok(Self {
            config,
            display_name,
            session: RwLock::new(Session::default()),
        })
    }

    fn build_client(&self) -> ConnectorResult<Client> {
        let mut headers = header::HeaderMap::new();
        match &self.config.auth {
            AuthConfig::Bearer { token } => {
                let value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| ConnectorError::invalid_configuration(format!("bad token: {e}")))?;
                headers.insert(header::AUTHORIZATION, value);
            }
            AuthConfig::None => {}
            other => {
                return Err(ConnectorError::invalid_configuration(format!(
                    "unsupported auth method for kubernetes: {other:?}"
                )));
            }
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .connect_timeout(self.config.connection.connect_timeout())
            .timeout(self.config.connection.read_timeout());

        if self.config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| ConnectorError::invalid_configuration(format!("failed to build client: {e}")))
    }

    async fn client(&self) -> ConnectorResult<Client> {
        let session = self.session.read().await;
        match (&session.state, &session.client) {
            (SessionState::Connected, Some(client)) => Ok(client.clone()),
            _ => Err(ConnectorError::NotConnected),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, client: &Client, path: &str) -> ConnectorResult<T> {
        let url = format!("{}{}", self.config.api_server.trim_end_matches('/'), path);
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("request failed", e))?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| ConnectorError::serialization(format!("decoding {path}: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::connection_failed(format!("{path} returned {}", response.status())),
            ),
            status => Err(ConnectorError::discovery_failed(format!(
                "{path} returned {status}"
            ))),
        }
    }

    /// Namespaces allowed by the scope filter.
    async fn list_namespaces(&self, client: &Client) -> ConnectorResult<Vec<String>> {
        let namespaces: ObjectList<Namespace> = self.get_json(client, "/api/v1/namespaces").await?;
        Ok(namespaces
            .items
            .into_iter()
            .map(|ns| ns.metadata.name)
            .filter(|name| self.config.namespaces.allows(name))
            .collect())
    }

    async fn list_pods(&self, client: &Client, namespace: &str) -> ConnectorResult<Vec<Pod>> {
        let pods: ObjectList<Pod> = self
            .get_json(client, &format!("/api/v1/namespaces/{namespace}/pods"))
            .await?;
        Ok(pods.items)
    }

    fn normalize_pod(&self, namespace: &str, pod: Pod) -> NormalizedAsset {
        let image = pod
            .spec
            .containers
            .first()
            .map(|c| c.image.as_str())
            .unwrap_or_default();
        let (image_ref, image_version) = split_image_reference(image);

        let mut asset =
            NormalizedAsset::new(Platform::Kubernetes, &self.config.cluster_name, namespace, pod.metadata.uid)
                .with_name(pod.metadata.name)
                .with_image(image_ref, image_version)
                .with_state(map_pod_phase(&pod.status.phase));

        for (key, value) in &pod.metadata.labels {
            asset.add_label(key, value);
        }
        if !pod.spec.node_name.is_empty() {
            asset.set_host(&pod.spec.node_name);
        }
        if self.config.resolve_owners {
            if let Some(owner) = pod
                .metadata
                .owner_references
                .iter()
                .find(|o| o.controller)
                .or_else(|| pod.metadata.owner_references.first())
            {
                asset.set_owner(format!("{}/{}", owner.kind, owner.name));
            }
        }
        asset
    }

    fn normalize_node(&self, node: Node) -> NormalizedAsset {
        // Nodes are cluster-scoped; the topology zone label is the closest
        // locality analogue when present.
        let region = node
            .metadata
            .labels
            .get("topology.kubernetes.io/zone")
            .cloned()
            .unwrap_or_else(|| self.config.cluster_name.clone());

        let mut asset =
            NormalizedAsset::new(Platform::Kubernetes, &self.config.cluster_name, region, node.metadata.uid)
                .with_name(node.metadata.name)
                .with_image(
                    node.status.node_info.os_image.clone(),
                    node.status.node_info.kernel_version.clone(),
                )
                .with_state(map_node_ready(&node.status.conditions));

        for (key, value) in &node.metadata.labels {
            asset.add_label(key, value);
        }
        if let Some(cpu) = node.status.capacity.get("cpu") {
            asset.add_spec("cpu", cpu);
        }
        if let Some(memory) = node.status.capacity.get("memory") {
            asset.add_spec("memory", memory);
        }
        if !node.status.node_info.kubelet_version.is_empty() {
            asset.add_spec("kubelet", &node.status.node_info.kubelet_version);
        }
        asset
    }
}

#[async_trait]
impl Connector for KubernetesConnector {
    fn platform(&self) -> Platform {
        Platform::Kubernetes
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn account(&self) -> &str {
        &self.config.cluster_name
    }

    async fn connect(&self) -> ConnectorResult<()> {
        let client = self.build_client()?;

        // Probe the API server before considering the session live.
        let url = format!("{}/version", self.config.api_server.trim_end_matches('/'));
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("api server unreachable", e))?;
        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(format!(
                "version probe returned {}",
                response.status()
            )));
        }
        let version: VersionInfo = response
            .json()
            .await
            .map_err(|e| ConnectorError::serialization(format!("decoding /version: {e}")))?;

        debug!(
            cluster = %self.config.cluster_name,
            version = %version.git_version,
            "Connected to kubernetes api server"
        );

        let mut session = self.session.write().await;
        session.state = SessionState::Connected;
        session.client = Some(client);
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        let mut session = self.session.write().await;
        session.client = None;
        session.state = SessionState::Closed;
        Ok(())
    }

    async fn health(&self) -> ConnectorResult<()> {
        let client = self.client().await?;
        self.get_json::<VersionInfo>(&client, "/version")
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ConnectorError::NotConnected => e,
                other => ConnectorError::health_check_failed(other.to_string()),
            })
    }

    #[instrument(skip(self, cancel), fields(cluster = %self.config.cluster_name))]
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery> {
        let client = self.client().await?;
        let namespaces = self.list_namespaces(&client).await.map_err(|e| {
            ConnectorError::discovery_failed(format!("cannot list namespaces: {e}"))
        })?;

        let mut discovery = Discovery::new();
        let mut attempted = 0usize;

        for namespace in &namespaces {
            if cancel.is_cancelled() {
                debug!(tenant_id = %tenant_id, "Discovery cancelled, returning partial results");
                break;
            }
            attempted += 1;
            match self.list_pods(&client, namespace).await {
                Ok(pods) => {
                    for pod in pods {
                        discovery.push_asset(self.normalize_pod(namespace, pod));
                    }
                }
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Namespace enumeration failed, skipping");
                    discovery.fail_scope(namespace, e.to_string());
                }
            }
        }

        if self.config.discover_nodes && !cancel.is_cancelled() {
            attempted += 1;
            match self.get_json::<ObjectList<Node>>(&client, "/api/v1/nodes").await {
                Ok(nodes) => {
                    for node in nodes.items {
                        discovery.push_asset(self.normalize_node(node));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Node enumeration failed, skipping");
                    discovery.fail_scope("nodes", e.to_string());
                }
            }
        }

        discovery.into_result(attempted)
    }

    async fn discover_images(
        &self,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<DiscoveredImage>> {
        let client = self.client().await?;
        let namespaces = self.list_namespaces(&client).await.map_err(|e| {
            ConnectorError::discovery_failed(format!("cannot list namespaces: {e}"))
        })?;

        // The cluster has no image catalogue of its own; the set of distinct
        // container images across running pods is the template lineage.
        let mut seen = BTreeSet::new();
        let mut images = Vec::new();

        for namespace in &namespaces {
            if cancel.is_cancelled() {
                break;
            }
            let pods = match self.list_pods(&client, namespace).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(namespace = %namespace, error = %e, "Namespace enumeration failed, skipping");
                    continue;
                }
            };
            for pod in pods {
                for container in pod.spec.containers {
                    if container.image.is_empty() || !seen.insert(container.image.clone()) {
                        continue;
                    }
                    let (image_ref, image_version) = split_image_reference(&container.image);
                    images.push(DiscoveredImage::new(
                        Platform::Kubernetes,
                        &self.config.cluster_name,
                        image_ref,
                        image_version,
                    ));
                }
            }
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connector() -> KubernetesConnector {
        KubernetesConnector::new(KubernetesConfig {
            api_server: "https://kube.example.com:6443".to_string(),
            cluster_name: "prod".to_string(),
            auth: AuthConfig::bearer("token"),
            namespaces: Default::default(),
            connection: Default::default(),
            insecure_skip_tls_verify: false,
            discover_nodes: false,
            resolve_owners: true,
        })
        .unwrap()
    }

    #[test]
    fn pod_phase_mapping_is_total() {
        assert_eq!(map_pod_phase("Running"), AssetState::Running);
        assert_eq!(map_pod_phase("Pending"), AssetState::Pending);
        assert_eq!(map_pod_phase("Succeeded"), AssetState::Terminated);
        assert_eq!(map_pod_phase("Failed"), AssetState::Terminated);
        assert_eq!(map_pod_phase("Unknown"), AssetState::Unknown);
        assert_eq!(map_pod_phase("Evicted"), AssetState::Unknown);
        assert_eq!(map_pod_phase(""), AssetState::Unknown);
    }

    #[test]
    fn node_ready_mapping() {
        let ready = vec![NodeCondition {
            condition_type: "Ready".to_string(),
            status: "True".to_string(),
        }];
        assert_eq!(map_node_ready(&ready), AssetState::Running);

        let not_ready = vec![NodeCondition {
            condition_type: "Ready".to_string(),
            status: "False".to_string(),
        }];
        assert_eq!(map_node_ready(&not_ready), AssetState::Unknown);
        assert_eq!(map_node_ready(&[]), AssetState::Unknown);
    }

    #[test]
    fn normalize_pod_builds_canonical_asset() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {
                "name": "api-7f9c4d-xvz",
                "uid": "0b1c9d8e-1111-2222-3333-444455556666",
                "labels": {"app": "api", "team": "payments"},
                "ownerReferences": [
                    {"kind": "ReplicaSet", "name": "api-7f9c4d", "controller": true}
                ]
            },
            "spec": {
                "nodeName": "node-a",
                "containers": [{"image": "registry.example.com:5000/api:2.4.1"}]
            },
            "status": {"phase": "Running"}
        }))
        .unwrap();

        let asset = connector().normalize_pod("payments", pod);
        assert_eq!(asset.platform, Platform::Kubernetes);
        assert_eq!(asset.account, "prod");
        assert_eq!(asset.region, "payments");
        assert_eq!(asset.instance_id, "0b1c9d8e-1111-2222-3333-444455556666");
        assert_eq!(asset.name, "api-7f9c4d-xvz");
        assert_eq!(asset.image_ref, "registry.example.com:5000/api");
        assert_eq!(asset.image_version, "2.4.1");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.tags.get("label:app"), Some(&"api".to_string()));
        assert_eq!(
            asset.tags.get("owner:controller"),
            Some(&"ReplicaSet/api-7f9c4d".to_string())
        );
        assert_eq!(asset.tags.get("node:host"), Some(&"node-a".to_string()));
    }

    #[test]
    fn normalize_pod_without_containers_or_owners() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "bare", "uid": "uid-2"},
            "status": {"phase": "Pending"}
        }))
        .unwrap();

        let asset = connector().normalize_pod("default", pod);
        assert_eq!(asset.image_ref, "");
        assert_eq!(asset.image_version, "latest");
        assert_eq!(asset.state, AssetState::Pending);
        assert!(!asset.tags.contains_key("owner:controller"));
    }

    #[test]
    fn normalize_node_uses_zone_and_capacity() {
        let node: Node = serde_json::from_value(json!({
            "metadata": {
                "name": "node-a",
                "uid": "node-uid-1",
                "labels": {"topology.kubernetes.io/zone": "us-east-1a"}
            },
            "status": {
                "conditions": [{"type": "Ready", "status": "True"}],
                "nodeInfo": {
                    "osImage": "Ubuntu 22.04.4 LTS",
                    "kernelVersion": "5.15.0-105-generic",
                    "kubeletVersion": "v1.31.2"
                },
                "capacity": {"cpu": "8", "memory": "32Gi"}
            }
        }))
        .unwrap();

        let asset = connector().normalize_node(node);
        assert_eq!(asset.region, "us-east-1a");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.image_ref, "Ubuntu 22.04.4 LTS");
        assert_eq!(asset.tags.get("spec:cpu"), Some(&"8".to_string()));
        assert_eq!(asset.tags.get("spec:kubelet"), Some(&"v1.31.2".to_string()));
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let connector = connector();
        assert!(matches!(
            connector.health().await,
            Err(ConnectorError::NotConnected)
        ));

        let cancel = CancellationToken::new();
        assert!(matches!(
            connector.discover_assets(TenantId::new(), &cancel).await,
            Err(ConnectorError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn close_is_always_safe() {
        let connector = connector();
        assert!(connector.close().await.is_ok());
        assert!(connector.close().await.is_ok());
    }
}
