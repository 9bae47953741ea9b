//! GCP connector configuration.

use serde::{Deserialize, Serialize};

use muster_connector::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::scope::ScopeFilter;
use muster_connector::types::Platform;

fn default_compute_endpoint() -> String {
    "https://compute.googleapis.com/compute/v1".to_string()
}

/// Configuration for a [`GcpConnector`](crate::GcpConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Project id used as the asset `account` scope.
    pub project_id: String,

    /// Bearer access token for the Compute API. Token acquisition
    /// (service-account exchange, workload identity) happens outside the
    /// connector.
    pub auth: AuthConfig,

    /// Zones to enumerate. Empty include list means every zone of the
    /// project.
    #[serde(default)]
    pub zones: ScopeFilter,

    /// Compute API endpoint override for tests.
    #[serde(default = "default_compute_endpoint")]
    pub compute_endpoint: String,

    /// Connect/read timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,
}

impl ConnectorConfig for GcpConfig {
    fn platform() -> Platform {
        Platform::Gcp
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.project_id.is_empty() {
            return Err(ConnectorError::invalid_configuration("project_id is required"));
        }
        if !matches!(self.auth, AuthConfig::Bearer { .. }) {
            return Err(ConnectorError::invalid_configuration(
                "gcp requires a bearer access token",
            ));
        }
        if !self.compute_endpoint.starts_with("http") {
            return Err(ConnectorError::invalid_configuration(format!(
                "compute_endpoint must be a URL, got '{}'",
                self.compute_endpoint
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
