//! Azure Resource Manager connector.
//!
//! Enumerates virtual machines per resource group through the ARM REST API.
//! Each resource group is one discovery scope. The immutable `vmId` GUID is
//! the asset identity — resource names can be deleted and recreated.

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

use crate::config::AzureConfig;

/// Connector for one Azure subscription.
pub struct AzureConnector {
    config: AzureConfig,
    display_name: String,
    client: Client,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    access_token: Option<String>,
}

impl std::fmt::Debug for AzureConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConnector")
            .field("config", &self.config.redacted())
            .finish()
    }
}

// ARM response shapes, limited to the fields discovery reads.

#[derive(Debug, Deserialize)]
struct ArmList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ResourceGroup {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VirtualMachine {
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    tags: std::collections::BTreeMap<String, String>,
    properties: VmProperties,
}

#[derive(Debug, Deserialize)]
struct VmProperties {
    #[serde(rename = "vmId", default)]
    vm_id: String,
    #[serde(rename = "hardwareProfile", default)]
    hardware_profile: HardwareProfile,
    #[serde(rename = "storageProfile", default)]
    storage_profile: StorageProfile,
    #[serde(rename = "instanceView", default)]
    instance_view: Option<InstanceView>,
}

#[derive(Debug, Deserialize, Default)]
struct HardwareProfile {
    #[serde(rename = "vmSize", default)]
    vm_size: String,
}

#[derive(Debug, Deserialize, Default)]
struct StorageProfile {
    #[serde(rename = "imageReference", default)]
    image_reference: Option<ImageReference>,
}

#[derive(Debug, Deserialize, Default)]
struct ImageReference {
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    offer: String,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    version: String,
    #[serde(rename = "exactVersion", default)]
    exact_version: String,
}

#[derive(Debug, Deserialize)]
struct InstanceView {
    #[serde(default)]
    statuses: Vec<VmStatus>,
}

#[derive(Debug, Deserialize)]
struct VmStatus {
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct ArmImage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    location: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Map an ARM power-state code onto the canonical lifecycle.
///
/// Codes arrive as `PowerState/<state>` inside the instance view; a VM with
/// no power status visible (agent down, freshly created) is `Unknown`.
fn map_power_state(instance_view: Option<&InstanceView>) -> AssetState {
    let Some(view) = instance_view else {
        return AssetState::Unknown;
    };
    let Some(power) = view
        .statuses
        .iter()
        .find_map(|s| s.code.strip_prefix("PowerState/"))
    else {
        return AssetState::Unknown;
    };

    match power {
        "running" => AssetState::Running,
        "starting" => AssetState::Pending,
        "stopping" | "stopped" | "deallocating" | "deallocated" => AssetState::Stopped,
        _ => AssetState::Unknown,
    }
}

impl AzureConnector {
    /// Create a connector from validated configuration.
    pub fn new(config: AzureConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connection.connect_timeout())
            .timeout(config.connection.read_timeout())
            .build()
            .map_err(|e| ConnectorError::invalid_configuration(format!("failed to build client: {e}")))?;

        let display_name = format!("azure: {}", config.subscription_id);
        Ok(Self {
            config,
            display_name,
            client,
            session: RwLock::new(Session::default()),
        })
    }

    /// Acquire an access token for the management endpoint.
    async fn fetch_token(&self) -> ConnectorResult<String> {
        match &self.config.auth {
            AuthConfig::Bearer { token } => Ok(token.clone()),
            AuthConfig::OAuth2 {
                token_url,
                client_id,
                client_secret,
                scopes,
            } => {
                let mut params = vec![
                    ("grant_type", "client_credentials".to_string()),
                    ("client_id", client_id.clone()),
                ];
                if let Some(secret) = client_secret {
                    params.push(("client_secret", secret.clone()));
                }
                let scope = if scopes.is_empty() {
                    format!("{}/.default", self.config.management_endpoint)
                } else {
                    scopes.join(" ")
                };
                params.push(("scope", scope));

                let response = self
                    .client
                    .post(token_url)
                    .form(&params)
                    .send()
                    .await
                    .map_err(|e| {
                        ConnectorError::connection_failed_with_source("token endpoint unreachable", e)
                    })?;
                if !response.status().is_success() {
                    return Err(ConnectorError::connection_failed(format!(
                        "token endpoint returned {}",
                        response.status()
                    )));
                }
                let token: TokenResponse = response.json().await.map_err(|e| {
                    ConnectorError::serialization(format!("decoding token response: {e}"))
                })?;
                Ok(token.access_token)
            }
            other => Err(ConnectorError::invalid_configuration(format!(
                "unsupported auth method for azure: {other:?}"
            ))),
        }
    }

    async fn token(&self) -> ConnectorResult<String> {
        let session = self.session.read().await;
        match (&session.state, &session.access_token) {
            (SessionState::Connected, Some(token)) => Ok(token.clone()),
            _ => Err(ConnectorError::NotConnected),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path_and_query: &str,
    ) -> ConnectorResult<T> {
        let url = format!(
            "{}{}",
            self.config.management_endpoint.trim_end_matches('/'),
            path_and_query
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("request failed", e))?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| ConnectorError::serialization(format!("decoding {path_and_query}: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::connection_failed(format!("arm returned {}", response.status())),
            ),
            status => Err(ConnectorError::discovery_failed(format!(
                "{path_and_query} returned {status}"
            ))),
        }
    }

    /// Resource groups allowed by the scope filter.
    async fn list_resource_groups(&self, token: &str) -> ConnectorResult<Vec<String>> {
        let path = format!(
            "/subscriptions/{}/resourcegroups?api-version=2021-04-01",
            self.config.subscription_id
        );
        let groups: ArmList<ResourceGroup> = self.get_json(token, &path).await?;
        Ok(groups
            .value
            .into_iter()
            .map(|g| g.name)
            .filter(|name| self.config.resource_groups.allows(name))
            .collect())
    }

    async fn list_virtual_machines(
        &self,
        token: &str,
        resource_group: &str,
    ) -> ConnectorResult<Vec<VirtualMachine>> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines?api-version={}&$expand=instanceView",
            self.config.subscription_id, resource_group, self.config.api_version
        );
        let vms: ArmList<VirtualMachine> = self.get_json(token, &path).await?;
        Ok(vms.value)
    }

    fn normalize_vm(&self, resource_group: &str, vm: VirtualMachine) -> Option<NormalizedAsset> {
        if vm.properties.vm_id.is_empty() {
            // Without the immutable vmId the record cannot be tracked.
            return None;
        }

        let (image_ref, image_version) = match &vm.properties.storage_profile.image_reference {
            Some(image) if !image.publisher.is_empty() => {
                let reference = format!("{}/{}/{}", image.publisher, image.offer, image.sku);
                let version = if !image.exact_version.is_empty() {
                    image.exact_version.clone()
                } else if !image.version.is_empty() {
                    image.version.clone()
                } else {
                    "latest".to_string()
                };
                (reference, version)
            }
            _ => (String::new(), String::new()),
        };

        let mut asset = NormalizedAsset::new(
            Platform::Azure,
            &self.config.subscription_id,
            &vm.location,
            &vm.properties.vm_id,
        )
        .with_name(&vm.name)
        .with_image(image_ref, image_version)
        .with_state(map_power_state(vm.properties.instance_view.as_ref()));

        for (key, value) in &vm.tags {
            asset.add_label(key, value);
        }
        asset
            .tags
            .insert("group:resource-group".to_string(), resource_group.to_string());
        if !vm.properties.hardware_profile.vm_size.is_empty() {
            asset.add_spec("vm-size", &vm.properties.hardware_profile.vm_size);
        }
        Some(asset)
    }
}

#[async_trait]
impl Connector for AzureConnector {
    fn platform(&self) -> Platform {
        Platform::Azure
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn account(&self) -> &str {
        &self.config.subscription_id
    }

    async fn connect(&self) -> ConnectorResult<()> {
        let token = self.fetch_token().await?;

        // Probe the subscription before considering the session live.
        let path = format!(
            "/subscriptions/{}?api-version=2022-12-01",
            self.config.subscription_id
        );
        self.get_json::<serde_json::Value>(&token, &path)
            .await
            .map_err(|e| ConnectorError::connection_failed(format!("subscription probe failed: {e}")))?;

        debug!(subscription_id = %self.config.subscription_id, "Connected to azure");

        let mut session = self.session.write().await;
        session.state = SessionState::Connected;
        session.access_token = Some(token);
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        let mut session = self.session.write().await;
        session.access_token = None;
        session.state = SessionState::Closed;
        Ok(())
    }

    async fn health(&self) -> ConnectorResult<()> {
        let token = self.token().await?;
        let path = format!(
            "/subscriptions/{}?api-version=2022-12-01",
            self.config.subscription_id
        );
        self.get_json::<serde_json::Value>(&token, &path)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ConnectorError::NotConnected => e,
                other => ConnectorError::health_check_failed(other.to_string()),
            })
    }

    #[instrument(skip(self, cancel), fields(subscription_id = %self.config.subscription_id))]
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery> {
        let token = self.token().await?;
        let groups = self.list_resource_groups(&token).await.map_err(|e| {
            ConnectorError::discovery_failed(format!("cannot list resource groups: {e}"))
        })?;

        let mut discovery = Discovery::new();
        let mut attempted = 0usize;

        for group in &groups {
            if cancel.is_cancelled() {
                debug!(tenant_id = %tenant_id, "Discovery cancelled, returning partial results");
                break;
            }
            attempted += 1;
            match self.list_virtual_machines(&token, group).await {
                Ok(vms) => {
                    for vm in vms {
                        if let Some(asset) = self.normalize_vm(group, vm) {
                            discovery.push_asset(asset);
                        }
                    }
                }
                Err(e) => {
                    warn!(resource_group = %group, error = %e, "Resource group enumeration failed, skipping");
                    discovery.fail_scope(group, e.to_string());
                }
            }
        }

        discovery.into_result(attempted)
    }

    async fn discover_images(
        &self,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<DiscoveredImage>> {
        let token = self.token().await?;
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let path = format!(
            "/subscriptions/{}/providers/Microsoft.Compute/images?api-version={}",
            self.config.subscription_id, self.config.api_version
        );
        let images: ArmList<ArmImage> = self.get_json(&token, &path).await.map_err(|e| {
            ConnectorError::discovery_failed(format!("cannot list images: {e}"))
        })?;

        Ok(images
            .value
            .into_iter()
            .map(|image| {
                let mut discovered = DiscoveredImage::new(
                    Platform::Azure,
                    &self.config.subscription_id,
                    &image.name,
                    "latest",
                )
                .with_name(&image.name);
                if !image.location.is_empty() {
                    discovered
                        .tags
                        .insert("group:location".to_string(), image.location);
                }
                discovered
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connector() -> AzureConnector {
        AzureConnector::new(AzureConfig {
            subscription_id: "sub-1".to_string(),
            auth: AuthConfig::bearer("token"),
            resource_groups: Default::default(),
            management_endpoint: "https://management.azure.com".to_string(),
            api_version: "2024-07-01".to_string(),
            connection: Default::default(),
        })
        .unwrap()
    }

    fn view(code: &str) -> InstanceView {
        InstanceView {
            statuses: vec![
                VmStatus {
                    code: "ProvisioningState/succeeded".to_string(),
                },
                VmStatus {
                    code: code.to_string(),
                },
            ],
        }
    }

    #[test]
    fn power_state_mapping() {
        assert_eq!(map_power_state(Some(&view("PowerState/running"))), AssetState::Running);
        assert_eq!(map_power_state(Some(&view("PowerState/starting"))), AssetState::Pending);
        assert_eq!(map_power_state(Some(&view("PowerState/stopped"))), AssetState::Stopped);
        assert_eq!(
            map_power_state(Some(&view("PowerState/deallocated"))),
            AssetState::Stopped
        );
        assert_eq!(
            map_power_state(Some(&view("PowerState/unknown"))),
            AssetState::Unknown
        );
        assert_eq!(map_power_state(None), AssetState::Unknown);
    }

    #[test]
    fn power_state_missing_maps_to_unknown() {
        let view = InstanceView {
            statuses: vec![VmStatus {
                code: "ProvisioningState/succeeded".to_string(),
            }],
        };
        assert_eq!(map_power_state(Some(&view)), AssetState::Unknown);
    }

    #[test]
    fn normalize_vm_builds_canonical_asset() {
        let vm: VirtualMachine = serde_json::from_value(json!({
            "name": "web-01",
            "location": "westeurope",
            "tags": {"env": "prod"},
            "properties": {
                "vmId": "9d4e2a7b-aaaa-bbbb-cccc-444455556666",
                "hardwareProfile": {"vmSize": "Standard_D2s_v5"},
                "storageProfile": {
                    "imageReference": {
                        "publisher": "Canonical",
                        "offer": "ubuntu-24_04-lts",
                        "sku": "server",
                        "version": "latest",
                        "exactVersion": "24.04.202405010"
                    }
                },
                "instanceView": {"statuses": [{"code": "PowerState/running"}]}
            }
        }))
        .unwrap();

        let asset = connector().normalize_vm("rg-web", vm).unwrap();
        assert_eq!(asset.platform, Platform::Azure);
        assert_eq!(asset.account, "sub-1");
        assert_eq!(asset.region, "westeurope");
        assert_eq!(asset.instance_id, "9d4e2a7b-aaaa-bbbb-cccc-444455556666");
        assert_eq!(asset.image_ref, "Canonical/ubuntu-24_04-lts/server");
        assert_eq!(asset.image_version, "24.04.202405010");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.tags.get("label:env"), Some(&"prod".to_string()));
        assert_eq!(
            asset.tags.get("group:resource-group"),
            Some(&"rg-web".to_string())
        );
        assert_eq!(
            asset.tags.get("spec:vm-size"),
            Some(&"Standard_D2s_v5".to_string())
        );
    }

    #[test]
    fn vm_without_vm_id_is_dropped() {
        let vm: VirtualMachine = serde_json::from_value(json!({
            "name": "ghost",
            "location": "westeurope",
            "properties": {}
        }))
        .unwrap();
        assert!(connector().normalize_vm("rg", vm).is_none());
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let connector = connector();
        assert!(matches!(
            connector.health().await,
            Err(ConnectorError::NotConnected)
        ));
        assert!(connector.close().await.is_ok());
    }
}
