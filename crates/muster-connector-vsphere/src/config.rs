//! vSphere connector configuration.

use serde::{Deserialize, Serialize};

use muster_connector::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::scope::ScopeFilter;
use muster_connector::types::Platform;

/// Configuration for a [`VsphereConnector`](crate::VsphereConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsphereConfig {
    /// vCenter base URL, e.g. `https://vcenter.example.com`.
    pub endpoint: String,

    /// vCenter credentials; the session login uses basic auth.
    pub auth: AuthConfig,

    /// Datacenters to enumerate. Empty include list means all datacenters.
    #[serde(default)]
    pub datacenters: ScopeFilter,

    /// Connect/read timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Accept the self-signed certificates common on lab vCenters.
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Fetch each VM's guest OS identifier as its image reference. Costs
    /// one extra request per VM.
    #[serde(default)]
    pub resolve_guest: bool,
}

impl ConnectorConfig for VsphereConfig {
    fn platform() -> Platform {
        Platform::Vsphere
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.endpoint.is_empty() {
            return Err(ConnectorError::invalid_configuration("endpoint is required"));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConnectorError::invalid_configuration(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        match &self.auth {
            AuthConfig::Basic { username, password } => {
                if username.is_empty() || password.as_deref().unwrap_or_default().is_empty() {
                    return Err(ConnectorError::invalid_configuration(
                        "vsphere requires a username and password",
                    ));
                }
            }
            _ => {
                return Err(ConnectorError::invalid_configuration(
                    "vsphere requires basic authentication",
                ));
            }
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        Self {
            auth: self.auth.redacted(),
            ..self.clone()
        }
    }
}

impl VsphereConfig {
    /// Host part of the endpoint, used as the asset `account` scope.
    #[must_use]
    pub fn endpoint_host(&self) -> String {
        self.endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string()
    }
}
