//! Google Compute Engine connector.
//!
//! Enumerates instances per zone through the Compute v1 REST API. Each zone
//! is one discovery scope. The numeric instance id is the identity — GCP
//! never reuses it, while instance names can be recreated.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use muster_connector::asset::{DiscoveredImage, NormalizedAsset};
use muster_connector::config::{AuthConfig, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::traits::{Connector, Discovery};
use muster_connector::types::{AssetState, Platform, SessionState};
use muster_core::TenantId;

use crate::config::GcpConfig;

/// Connector for one GCP project.
pub struct GcpConnector {
    config: GcpConfig,
    display_name: String,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    client: Option<Client>,
}

impl std::fmt::Debug for GcpConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpConnector")
            .field("config", &self.config.redacted())
            .finish()
    }
}

// Compute API response shapes, limited to the fields discovery reads.

#[derive(Debug, Deserialize)]
struct ComputeList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Zone {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ComputeInstance {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "machineType", default)]
    machine_type: String,
    #[serde(default)]
    labels: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    disks: Vec<AttachedDisk>,
    #[serde(rename = "createdBy", default)]
    created_by: String,
}

#[derive(Debug, Deserialize, Default)]
struct AttachedDisk {
    #[serde(default)]
    boot: bool,
    #[serde(default)]
    licenses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MachineImage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    family: String,
}

/// Map a Compute Engine status onto the canonical lifecycle.
///
/// GCP calls a stopped instance `TERMINATED`; it still exists and can be
/// started again, so it maps to `Stopped`, not `Terminated`.
fn map_instance_status(status: &str) -> AssetState {
    match status {
        "RUNNING" => AssetState::Running,
        "PROVISIONING" | "STAGING" => AssetState::Pending,
        "STOPPING" | "SUSPENDING" | "SUSPENDED" | "TERMINATED" => AssetState::Stopped,
        "REPAIRING" => AssetState::Pending,
        _ => AssetState::Unknown,
    }
}

/// Last path segment of a fully-qualified resource URL.
fn resource_tail(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

impl GcpConnector {
    /// Create a connector from validated configuration.
    pub fn new(config: GcpConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let display_name = format!("gcp: {}", config.project_id);
        Ok(Self {
            config,
            display_name,
            session: RwLock::new(Session::default()),
        })
    }

    fn build_client(&self) -> ConnectorResult<Client> {
        let AuthConfig::Bearer { token } = &self.config.auth else {
            return Err(ConnectorError::invalid_configuration(
                "gcp requires a bearer access token",
            ));
        };

        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ConnectorError::invalid_configuration(format!("bad token: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);

        Client::builder()
            .default_headers(headers)
            .connect_timeout(self.config.connection.connect_timeout())
            .timeout(self.config.connection.read_timeout())
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

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        client: &Client,
        path: &str,
    ) -> ConnectorResult<T> {
        let url = format!("{}{}", self.config.compute_endpoint.trim_end_matches('/'), path);
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
                ConnectorError::connection_failed(format!("compute api returned {}", response.status())),
            ),
            status => Err(ConnectorError::discovery_failed(format!(
                "{path} returned {status}"
            ))),
        }
    }

    /// Project zones allowed by the scope filter.
    async fn list_zones(&self, client: &Client) -> ConnectorResult<Vec<String>> {
        let path = format!("/projects/{}/zones", self.config.project_id);
        let zones: ComputeList<Zone> = self.get_json(client, &path).await?;
        Ok(zones
            .items
            .into_iter()
            .map(|z| z.name)
            .filter(|name| self.config.zones.allows(name))
            .collect())
    }

    async fn list_instances(
        &self,
        client: &Client,
        zone: &str,
    ) -> ConnectorResult<Vec<ComputeInstance>> {
        let path = format!("/projects/{}/zones/{zone}/instances", self.config.project_id);
        let instances: ComputeList<ComputeInstance> = self.get_json(client, &path).await?;
        Ok(instances.items)
    }

    fn normalize_instance(&self, zone: &str, instance: ComputeInstance) -> Option<NormalizedAsset> {
        if instance.id.is_empty() {
            return None;
        }

        // instances.list carries no source-image field; the boot disk's
        // license tail is the closest lineage signal available without a
        // per-disk read.
        let image_ref = instance
            .disks
            .iter()
            .find(|d| d.boot)
            .and_then(|d| d.licenses.last())
            .map(|l| resource_tail(l).to_string())
            .unwrap_or_default();
        let image_version = if image_ref.is_empty() {
            String::new()
        } else {
            "latest".to_string()
        };

        let mut asset = NormalizedAsset::new(Platform::Gcp, &self.config.project_id, zone, &instance.id)
            .with_name(&instance.name)
            .with_image(image_ref, image_version)
            .with_state(map_instance_status(&instance.status));

        for (key, value) in &instance.labels {
            asset.add_label(key, value);
        }
        if !instance.machine_type.is_empty() {
            asset.add_spec("machine-type", resource_tail(&instance.machine_type));
        }
        if !instance.created_by.is_empty() {
            asset.set_owner(resource_tail(&instance.created_by));
        }
        Some(asset)
    }
}

#[async_trait]
impl Connector for GcpConnector {
    fn platform(&self) -> Platform {
        Platform::Gcp
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn account(&self) -> &str {
        &self.config.project_id
    }

    async fn connect(&self) -> ConnectorResult<()> {
        let client = self.build_client()?;

        // Probe the project before considering the session live.
        let path = format!("/projects/{}", self.config.project_id);
        let url = format!("{}{}", self.config.compute_endpoint.trim_end_matches('/'), path);
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("compute api unreachable", e))?;
        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(format!(
                "project probe returned {}",
                response.status()
            )));
        }

        debug!(project_id = %self.config.project_id, "Connected to gcp");

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
        let path = format!("/projects/{}", self.config.project_id);
        self.get_json::<serde_json::Value>(&client, &path)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ConnectorError::NotConnected => e,
                other => ConnectorError::health_check_failed(other.to_string()),
            })
    }

    #[instrument(skip(self, cancel), fields(project_id = %self.config.project_id))]
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery> {
        let client = self.client().await?;
        let zones = self
            .list_zones(&client)
            .await
            .map_err(|e| ConnectorError::discovery_failed(format!("cannot list zones: {e}")))?;

        let mut discovery = Discovery::new();
        let mut attempted = 0usize;

        for zone in &zones {
            if cancel.is_cancelled() {
                debug!(tenant_id = %tenant_id, "Discovery cancelled, returning partial results");
                break;
            }
            attempted += 1;
            match self.list_instances(&client, zone).await {
                Ok(instances) => {
                    for instance in instances {
                        if let Some(asset) = self.normalize_instance(zone, instance) {
                            discovery.push_asset(asset);
                        }
                    }
                }
                Err(e) => {
                    warn!(zone = %zone, error = %e, "Zone enumeration failed, skipping");
                    discovery.fail_scope(zone, e.to_string());
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
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let path = format!("/projects/{}/global/images", self.config.project_id);
        let images: ComputeList<MachineImage> = self
            .get_json(&client, &path)
            .await
            .map_err(|e| ConnectorError::discovery_failed(format!("cannot list images: {e}")))?;

        Ok(images
            .items
            .into_iter()
            .map(|image| {
                let version = if image.family.is_empty() {
                    "latest".to_string()
                } else {
                    image.family
                };
                DiscoveredImage::new(Platform::Gcp, &self.config.project_id, &image.name, version)
                    .with_name(&image.name)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connector() -> GcpConnector {
        GcpConnector::new(GcpConfig {
            project_id: "acme-prod".to_string(),
            auth: AuthConfig::bearer("token"),
            zones: Default::default(),
            compute_endpoint: "https://compute.googleapis.com/compute/v1".to_string(),
            connection: Default::default(),
        })
        .unwrap()
    }

    #[test]
    fn status_mapping_is_explicit() {
        assert_eq!(map_instance_status("RUNNING"), AssetState::Running);
        assert_eq!(map_instance_status("PROVISIONING"), AssetState::Pending);
        assert_eq!(map_instance_status("STAGING"), AssetState::Pending);
        assert_eq!(map_instance_status("REPAIRING"), AssetState::Pending);
        assert_eq!(map_instance_status("STOPPING"), AssetState::Stopped);
        assert_eq!(map_instance_status("SUSPENDED"), AssetState::Stopped);
        // GCP's TERMINATED means powered off, not gone.
        assert_eq!(map_instance_status("TERMINATED"), AssetState::Stopped);
        assert_eq!(map_instance_status("SOMETHING_NEW"), AssetState::Unknown);
        assert_eq!(map_instance_status(""), AssetState::Unknown);
    }

    #[test]
    fn resource_tail_takes_last_segment() {
        assert_eq!(
            resource_tail("https://www.googleapis.com/compute/v1/projects/p/zones/z/machineTypes/e2-medium"),
            "e2-medium"
        );
        assert_eq!(resource_tail("plain"), "plain");
    }

    #[test]
    fn normalize_instance_builds_canonical_asset() {
        let instance: ComputeInstance = serde_json::from_value(json!({
            "id": "5837050224",
            "name": "web-01",
            "status": "RUNNING",
            "machineType": "https://compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-medium",
            "labels": {"env": "prod"},
            "disks": [
                {"boot": false, "licenses": []},
                {"boot": true, "licenses": ["https://compute/v1/projects/debian-cloud/global/licenses/debian-12-bookworm"]}
            ],
            "createdBy": "projects/p/zones/z/instanceGroupManagers/web-mig"
        }))
        .unwrap();

        let asset = connector()
            .normalize_instance("us-central1-a", instance)
            .unwrap();
        assert_eq!(asset.platform, Platform::Gcp);
        assert_eq!(asset.account, "acme-prod");
        assert_eq!(asset.region, "us-central1-a");
        assert_eq!(asset.instance_id, "5837050224");
        assert_eq!(asset.image_ref, "debian-12-bookworm");
        assert_eq!(asset.image_version, "latest");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.tags.get("label:env"), Some(&"prod".to_string()));
        assert_eq!(asset.tags.get("spec:machine-type"), Some(&"e2-medium".to_string()));
        assert_eq!(asset.tags.get("owner:controller"), Some(&"web-mig".to_string()));
    }

    #[test]
    fn instance_without_id_is_dropped() {
        let instance: ComputeInstance = serde_json::from_value(json!({
            "name": "ghost", "status": "RUNNING"
        }))
        .unwrap();
        assert!(connector().normalize_instance("z", instance).is_none());
    }

    #[test]
    fn instance_without_boot_disk_has_empty_image() {
        let instance: ComputeInstance = serde_json::from_value(json!({
            "id": "99", "name": "bare", "status": "TERMINATED"
        }))
        .unwrap();
        let asset = connector().normalize_instance("z", instance).unwrap();
        assert!(asset.image_ref.is_empty());
        assert!(asset.image_version.is_empty());
        assert_eq!(asset.state, AssetState::Stopped);
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
            connector.discover_images(&cancel).await,
            Err(ConnectorError::NotConnected)
        ));
    }
}
