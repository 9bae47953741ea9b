//! Kubernetes connector configuration.

use serde::{Deserialize, Serialize};

use muster_connector::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::scope::ScopeFilter;
use muster_connector::types::Platform;

/// Configuration for a [`KubernetesConnector`](crate::KubernetesConnector).
///
/// Immutable for the connector's lifetime; changing it means constructing a
/// new connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// API server base URL, e.g. `https://kube.prod.example.com:6443`.
    pub api_server: String,

    /// Cluster name used as the asset `account` scope.
    pub cluster_name: String,

    /// Authentication; typically a service-account bearer token.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Namespaces to enumerate. Empty include list means all namespaces.
    #[serde(default)]
    pub namespaces: ScopeFilter,

    /// Connect/read timeouts.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Skip TLS certificate verification (self-signed API servers in lab
    /// clusters only).
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Also emit cluster nodes as assets.
    #[serde(default)]
    pub discover_nodes: bool,

    /// Resolve the owning controller of each pod into an `owner:` tag.
    #[serde(default = "default_true")]
    pub resolve_owners: bool,
}

fn default_true() -> bool {
    true
}

impl ConnectorConfig for KubernetesConfig {
    fn platform() -> Platform {
        Platform::Kubernetes
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.api_server.is_empty() {
            return Err(ConnectorError::invalid_configuration("api_server is required"));
        }
        if !self.api_server.starts_with("http://") && !self.api_server.starts_with("https://") {
            return Err(ConnectorError::invalid_configuration(format!(
                "api_server must be an http(s) URL, got '{}'",
                self.api_server
            )));
        }
        if self.cluster_name.is_empty() {
            return Err(ConnectorError::invalid_configuration("cluster_name is required"));
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

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> KubernetesConfig {
        KubernetesConfig {
            api_server: "https://kube.example.com:6443".to_string(),
            cluster_name: "prod".to_string(),
            auth: AuthConfig::bearer("sa-token"),
            namespaces: ScopeFilter::default(),
            connection: ConnectionSettings::default(),
            insecure_skip_tls_verify: false,
            discover_nodes: false,
            resolve_owners: true,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn missing_api_server_rejected() {
        let config = KubernetesConfig {
            api_server: String::new(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_url_api_server_rejected() {
        let config = KubernetesConfig {
            api_server: "kube.example.com".to_string(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn redaction_hides_token() {
        let redacted = base_config().redacted();
        if let AuthConfig::Bearer { token } = redacted.auth {
            assert_eq!(token, "***REDACTED***");
        } else {
            panic!("expected Bearer auth");
        }
        assert_eq!(redacted.cluster_name, "prod");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: KubernetesConfig = serde_json::from_str(
            r#"{"api_server": "https://k.example.com", "cluster_name": "dev"}"#,
        )
        .unwrap();
        assert!(config.resolve_owners);
        assert!(!config.discover_nodes);
        assert!(config.namespaces.allows("default"));
    }
}
