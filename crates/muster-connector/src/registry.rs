//! Connector registry.
//!
//! Process-owned map of live connectors. The scheduler iterates the
//! registry to drive discovery; removal closes the connector's session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::ConnectorId;
use crate::traits::Connector;
use crate::types::Platform;

/// A connector behind a shared, dynamically-typed handle.
pub type BoxedConnector = Arc<dyn Connector>;

/// Registry of configured, live connectors.
///
/// Two connectors may share a platform (two clusters, two subscriptions)
/// but never the same `(platform, account)` identity.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<ConnectorId, BoxedConnector>>,
}

impl ConnectorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector and return its id.
    ///
    /// Fails with `InvalidConfiguration` when a connector for the same
    /// `(platform, account)` is already registered.
    pub async fn register(&self, connector: BoxedConnector) -> ConnectorResult<ConnectorId> {
        let mut connectors = self.connectors.write().await;

        let duplicate = connectors.values().any(|existing| {
            existing.platform() == connector.platform()
                && existing.account().eq_ignore_ascii_case(connector.account())
        });
        if duplicate {
            return Err(ConnectorError::invalid_configuration(format!(
                "a connector for {} account '{}' is already registered",
                connector.platform(),
                connector.account()
            )));
        }

        let id = ConnectorId::new();
        info!(
            connector_id = %id,
            platform = %connector.platform(),
            account = %connector.account(),
            "Registered connector"
        );
        connectors.insert(id, connector);
        Ok(id)
    }

    /// Look up a connector by id.
    pub async fn get(&self, id: ConnectorId) -> Option<BoxedConnector> {
        self.connectors.read().await.get(&id).cloned()
    }

    /// All registered connectors with their ids.
    pub async fn list(&self) -> Vec<(ConnectorId, BoxedConnector)> {
        self.connectors
            .read()
            .await
            .iter()
            .map(|(id, c)| (*id, c.clone()))
            .collect()
    }

    /// Registered connectors for one platform.
    pub async fn list_by_platform(&self, platform: Platform) -> Vec<(ConnectorId, BoxedConnector)> {
        self.connectors
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.platform() == platform)
            .map(|(id, c)| (*id, c.clone()))
            .collect()
    }

    /// Remove a connector, closing its session.
    ///
    /// Returns the removed connector, or `None` when the id is unknown.
    pub async fn remove(&self, id: ConnectorId) -> Option<BoxedConnector> {
        let removed = self.connectors.write().await.remove(&id);
        if let Some(connector) = &removed {
            if let Err(e) = connector.close().await {
                warn!(connector_id = %id, error = %e, "Failed to close removed connector");
            }
            info!(connector_id = %id, platform = %connector.platform(), "Removed connector");
        }
        removed
    }

    /// Number of registered connectors.
    pub async fn len(&self) -> usize {
        self.connectors.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.connectors.read().await.is_empty()
    }
}
