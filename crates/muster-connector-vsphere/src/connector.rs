//! VMware vSphere connector.
//!
//! Talks to the vCenter Automation REST API. `connect` performs a session
//! login and holds the returned token for the connector's lifetime; `close`
//! deletes the server-side session. Each datacenter is one discovery scope.
//! The VM managed-object reference (`vm-123`) is the asset identity.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
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

use crate::config::VsphereConfig;

const SESSION_HEADER: &str = "vmware-api-session-id";

/// Connector for one vCenter instance.
pub struct VsphereConnector {
    config: VsphereConfig,
    display_name: String,
    account: String,
    client: Client,
    session: RwLock<Session>,
}

#[derive(Default)]
struct Session {
    state: SessionState,
    token: Option<String>,
}

impl std::fmt::Debug for VsphereConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereConnector")
            .field("config", &self.config.redacted())
            .finish()
    }
}

// Automation API response shapes, limited to the fields discovery reads.

#[derive(Debug, Deserialize)]
struct Datacenter {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    power_state: String,
    #[serde(default)]
    cpu_count: Option<u32>,
    #[serde(default)]
    memory_size_mib: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VmDetail {
    #[serde(default)]
    guest_os: String,
}

#[derive(Debug, Deserialize)]
struct LibraryItem {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    item_type: String,
    #[serde(default)]
    version: String,
}

/// Map a vSphere power state onto the canonical lifecycle.
///
/// vSphere has no creation-in-progress state at this API level, so nothing
/// maps to `Pending`; a suspended VM is parked on disk and maps to
/// `Stopped`.
fn map_power_state(power_state: &str) -> AssetState {
    match power_state {
        "POWERED_ON" => AssetState::Running,
        "POWERED_OFF" | "SUSPENDED" => AssetState::Stopped,
        _ => AssetState::Unknown,
    }
}

impl VsphereConnector {
    /// Create a connector from validated configuration.
    pub fn new(config: VsphereConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .connect_timeout(config.connection.connect_timeout())
            .timeout(config.connection.read_timeout());
        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| ConnectorError::invalid_configuration(format!("failed to build client: {e}")))?;

        let account = config.endpoint_host();
        let display_name = format!("vsphere: {account}");
        Ok(Self {
            config,
            display_name,
            account,
            client,
            session: RwLock::new(Session::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    async fn token(&self) -> ConnectorResult<String> {
        let session = self.session.read().await;
        match (&session.state, &session.token) {
            (SessionState::Connected, Some(token)) => Ok(token.clone()),
            _ => Err(ConnectorError::NotConnected),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
    ) -> ConnectorResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .header(SESSION_HEADER, token)
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("request failed", e))?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| ConnectorError::serialization(format!("decoding {path}: {e}"))),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                ConnectorError::connection_failed(format!("vcenter returned {}", response.status())),
            ),
            status => Err(ConnectorError::discovery_failed(format!(
                "{path} returned {status}"
            ))),
        }
    }

    /// Datacenters allowed by the scope filter.
    async fn list_datacenters(&self, token: &str) -> ConnectorResult<Vec<Datacenter>> {
        let datacenters: Vec<Datacenter> = self.get_json(token, "/api/vcenter/datacenter").await?;
        Ok(datacenters
            .into_iter()
            .filter(|dc| self.config.datacenters.allows(&dc.name))
            .collect())
    }

    async fn list_vms(&self, token: &str, datacenter_id: &str) -> ConnectorResult<Vec<VmSummary>> {
        self.get_json(token, &format!("/api/vcenter/vm?datacenters={datacenter_id}"))
            .await
    }

    async fn normalize_vm(
        &self,
        token: &str,
        datacenter_name: &str,
        vm: VmSummary,
    ) -> NormalizedAsset {
        let mut asset = NormalizedAsset::new(Platform::Vsphere, &self.account, datacenter_name, &vm.vm)
            .with_name(&vm.name)
            .with_state(map_power_state(&vm.power_state));

        if let Some(cpus) = vm.cpu_count {
            asset.add_spec("cpus", cpus.to_string());
        }
        if let Some(memory) = vm.memory_size_mib {
            asset.add_spec("memory-mib", memory.to_string());
        }

        if self.config.resolve_guest {
            // Best effort: a VM whose detail read fails keeps an empty
            // image reference rather than failing the scope.
            match self
                .get_json::<VmDetail>(token, &format!("/api/vcenter/vm/{}", vm.vm))
                .await
            {
                Ok(detail) if !detail.guest_os.is_empty() => {
                    asset.image_ref = detail.guest_os;
                    asset.image_version = "latest".to_string();
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(vm = %vm.vm, error = %e, "Guest resolution failed");
                }
            }
        }

        asset
    }
}

#[async_trait]
impl Connector for VsphereConnector {
    fn platform(&self) -> Platform {
        Platform::Vsphere
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn account(&self) -> &str {
        &self.account
    }

    async fn connect(&self) -> ConnectorResult<()> {
        let AuthConfig::Basic { username, password } = &self.config.auth else {
            return Err(ConnectorError::invalid_configuration(
                "vsphere requires basic authentication",
            ));
        };
        let credentials = format!("{}:{}", username, password.as_deref().unwrap_or_default());
        let encoded = BASE64.encode(credentials);

        let response = self
            .client
            .post(self.url("/api/session"))
            .header("Authorization", format!("Basic {encoded}"))
            .send()
            .await
            .map_err(|e| ConnectorError::connection_failed_with_source("vcenter unreachable", e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ConnectorError::connection_failed("invalid vcenter credentials"));
        }
        if !response.status().is_success() {
            return Err(ConnectorError::connection_failed(format!(
                "session login returned {}",
                response.status()
            )));
        }

        // The token comes back as a bare JSON string.
        let token: String = response
            .json()
            .await
            .map_err(|e| ConnectorError::serialization(format!("decoding session token: {e}")))?;

        debug!(vcenter = %self.account, "Established vcenter session");

        let mut session = self.session.write().await;
        session.state = SessionState::Connected;
        session.token = Some(token);
        Ok(())
    }

    async fn close(&self) -> ConnectorResult<()> {
        let mut session = self.session.write().await;
        if let Some(token) = session.token.take() {
            // Server-side logout is courtesy; a failure still closes the
            // local session.
            if let Err(e) = self
                .client
                .delete(self.url("/api/session"))
                .header(SESSION_HEADER, &token)
                .send()
                .await
            {
                warn!(vcenter = %self.account, error = %e, "Session logout failed");
            }
        }
        session.state = SessionState::Closed;
        Ok(())
    }

    async fn health(&self) -> ConnectorResult<()> {
        let token = self.token().await?;
        self.get_json::<serde_json::Value>(&token, "/api/session")
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ConnectorError::NotConnected => e,
                other => ConnectorError::health_check_failed(other.to_string()),
            })
    }

    #[instrument(skip(self, cancel), fields(vcenter = %self.account))]
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery> {
        let token = self.token().await?;
        let datacenters = self.list_datacenters(&token).await.map_err(|e| {
            ConnectorError::discovery_failed(format!("cannot list datacenters: {e}"))
        })?;

        let mut discovery = Discovery::new();
        let mut attempted = 0usize;

        for dc in &datacenters {
            if cancel.is_cancelled() {
                debug!(tenant_id = %tenant_id, "Discovery cancelled, returning partial results");
                break;
            }
            attempted += 1;
            match self.list_vms(&token, &dc.datacenter).await {
                Ok(vms) => {
                    for vm in vms {
                        let asset = self.normalize_vm(&token, &dc.name, vm).await;
                        discovery.push_asset(asset);
                    }
                }
                Err(e) => {
                    warn!(datacenter = %dc.name, error = %e, "Datacenter enumeration failed, skipping");
                    discovery.fail_scope(&dc.name, e.to_string());
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

        // Templates live in content libraries; enumerate every library's
        // items and keep the VM templates.
        let library_ids: Vec<String> = self
            .get_json(&token, "/api/content/library")
            .await
            .map_err(|e| ConnectorError::discovery_failed(format!("cannot list libraries: {e}")))?;

        let mut images = Vec::new();
        for library_id in &library_ids {
            if cancel.is_cancelled() {
                break;
            }
            let item_ids: Vec<String> = match self
                .get_json(&token, &format!("/api/content/library/item?library_id={library_id}"))
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(library = %library_id, error = %e, "Library enumeration failed, skipping");
                    continue;
                }
            };

            for item_id in &item_ids {
                let item: LibraryItem = match self
                    .get_json(&token, &format!("/api/content/library/item/{item_id}"))
                    .await
                {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(item = %item_id, error = %e, "Library item read failed, skipping");
                        continue;
                    }
                };
                if item.item_type != "vm-template" && item.item_type != "ovf" {
                    continue;
                }
                let version = if item.version.is_empty() {
                    "latest".to_string()
                } else {
                    item.version
                };
                images.push(
                    DiscoveredImage::new(Platform::Vsphere, &self.account, &item.name, version)
                        .with_name(&item.name),
                );
            }
        }

        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> VsphereConfig {
        VsphereConfig {
            endpoint: "https://vcenter.example.com".to_string(),
            auth: AuthConfig::basic("discovery@vsphere.local", "secret"),
            datacenters: Default::default(),
            connection: Default::default(),
            insecure_skip_tls_verify: false,
            resolve_guest: false,
        }
    }

    #[test]
    fn power_state_mapping() {
        assert_eq!(map_power_state("POWERED_ON"), AssetState::Running);
        assert_eq!(map_power_state("POWERED_OFF"), AssetState::Stopped);
        assert_eq!(map_power_state("SUSPENDED"), AssetState::Stopped);
        assert_eq!(map_power_state("RESETTING"), AssetState::Unknown);
        assert_eq!(map_power_state(""), AssetState::Unknown);
    }

    #[test]
    fn vm_summary_deserializes() {
        let vm: VmSummary = serde_json::from_value(json!({
            "vm": "vm-1042",
            "name": "db-primary",
            "power_state": "POWERED_ON",
            "cpu_count": 8,
            "memory_size_mib": 32768
        }))
        .unwrap();
        assert_eq!(vm.vm, "vm-1042");
        assert_eq!(vm.cpu_count, Some(8));
    }

    #[tokio::test]
    async fn normalize_vm_builds_canonical_asset() {
        let connector = VsphereConnector::new(config()).unwrap();
        let vm = VmSummary {
            vm: "vm-1042".to_string(),
            name: "db-primary".to_string(),
            power_state: "POWERED_ON".to_string(),
            cpu_count: Some(8),
            memory_size_mib: Some(32768),
        };

        let asset = connector.normalize_vm("unused-token", "dc-east", vm).await;
        assert_eq!(asset.platform, Platform::Vsphere);
        assert_eq!(asset.account, "vcenter.example.com");
        assert_eq!(asset.region, "dc-east");
        assert_eq!(asset.instance_id, "vm-1042");
        assert_eq!(asset.state, AssetState::Running);
        assert_eq!(asset.tags.get("spec:cpus"), Some(&"8".to_string()));
        assert_eq!(asset.tags.get("spec:memory-mib"), Some(&"32768".to_string()));
        // Guest resolution disabled: no image lineage at list level.
        assert!(asset.image_ref.is_empty());
    }

    #[tokio::test]
    async fn operations_require_connect() {
        let connector = VsphereConnector::new(config()).unwrap();
        assert!(matches!(
            connector.health().await,
            Err(ConnectorError::NotConnected)
        ));
        assert!(connector.close().await.is_ok());
        assert!(connector.close().await.is_ok());
    }
}
