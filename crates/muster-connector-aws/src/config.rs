//! AWS connector configuration.
//!
//! Credentials come from the ambient AWS credential chain (environment,
//! profile, instance role); the configuration only scopes what discovery
//! enumerates.

use serde::{Deserialize, Serialize};

use muster_connector::config::ConnectorConfig;
use muster_connector::error::{ConnectorError, ConnectorResult};
use muster_connector::scope::ScopeFilter;
use muster_connector::types::Platform;

/// Configuration for an [`AwsConnector`](crate::AwsConnector).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// The account id this connector is expected to cover. Verified against
    /// the caller identity at connect time.
    pub account_id: String,

    /// Regions to enumerate. Empty include list means every region the
    /// account has enabled.
    #[serde(default)]
    pub regions: ScopeFilter,

    /// Custom endpoint for testing against local stacks.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub endpoint_url: Option<String>,

    /// Also enumerate account-owned machine images in `discover_images`.
    #[serde(default = "default_true")]
    pub discover_owned_images: bool,
}

fn default_true() -> bool {
    true
}

impl ConnectorConfig for AwsConfig {
    fn platform() -> Platform {
        Platform::Aws
    }

    fn validate(&self) -> ConnectorResult<()> {
        if self.account_id.is_empty() {
            return Err(ConnectorError::invalid_configuration("account_id is required"));
        }
        if !self.account_id.chars().all(|c| c.is_ascii_digit()) || self.account_id.len() != 12 {
            return Err(ConnectorError::invalid_configuration(format!(
                "account_id must be a 12-digit account number, got '{}'",
                self.account_id
            )));
        }
        Ok(())
    }

    fn redacted(&self) -> Self {
        // No inline credentials to hide.
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_account_id_passes() {
        let config = AwsConfig {
            account_id: "123456789012".to_string(),
            regions: ScopeFilter::default(),
            endpoint_url: None,
            discover_owned_images: true,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_account_id_rejected() {
        for bad in ["", "12345", "12345678901x"] {
            let config = AwsConfig {
                account_id: bad.to_string(),
                regions: ScopeFilter::default(),
                endpoint_url: None,
                discover_owned_images: true,
            };
            assert!(config.validate().is_err(), "expected '{bad}' to be rejected");
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: AwsConfig =
            serde_json::from_str(r#"{"account_id": "123456789012"}"#).unwrap();
        assert!(config.discover_owned_images);
        assert!(config.regions.allows("eu-west-1"));
    }
}
