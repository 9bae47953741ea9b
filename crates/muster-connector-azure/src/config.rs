//! Azure connector configuration.

use serde::{Deserialize, Serialize};

use muster_connector::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::scope::ScopeFilter;
use muster_connector::types::Platform;

fn default_management_endpoint() -> String {
    "https://management.azure.com".to_string()
}

fn default_api_version() -> String {
    "2024-07-01".to_string()
}

/// Configuration for an [`AzureConnector`](crate::AzureConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Subscription id used as the asset `account` scope.
    pub subscription_id: String,

    /// Service-principal authentication; OAuth2 client credentials against
    /// the tenant's token endpoint.
    pub auth: AuthConfig,

    /// Resource groups to enumerate. Empty include list means all groups in
    /// the subscription.
    #[serde(default)]
    pub resource_groups: ScopeFilter,

    /// Resource Manager endpoint; sovereign clouds override this.
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// Compute API version sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Connect/read timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl ConnectorConfig for AzureConfig {
    fn platform() -> Platform {
        Platform::Azure
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.subscription_id.is_empty() {
            return Err(ConnectorError::invalid_configuration("subscription_id is required"));
        }
        if !matches!(self.auth, AuthConfig::OAuth2 { .. } | AuthConfig::Bearer { .. }) {
            return Err(ConnectorError::invalid_configuration(
                "azure requires oauth2 client credentials or a bearer token",
            ));
        }
        if !self.management_endpoint.starts_with("http") {
            return Err(ConnectorError::invalid_configuration(format!(
                "management_endpoint must be a URL, got '{}'",
                self.management_endpoint
            )));
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
