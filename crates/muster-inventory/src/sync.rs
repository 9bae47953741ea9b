//! Reconciliation engine.
//!
//! Diffs one discovery batch against the stored inventory for the same
//! `(tenant, platform)`: upsert what was seen, terminate what disappeared,
//! and report counts. The engine never invents an identity and never
//! terminates an asset that appeared in the current batch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use muster_connector::traits::Discovery;
use muster_connector::types::Platform;
use muster_core::TenantId;

use crate::store::{AssetFields, AssetStore};

/// Summary of one reconciliation run, the pipeline's only output surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub tenant_id: TenantId,
    pub platform: Platform,
    /// Assets present in the discovery batch.
    pub assets_found: usize,
    /// Assets inserted for the first time.
    pub assets_new: usize,
    /// Assets that already existed and were refreshed.
    pub assets_updated: usize,
    /// Assets transitioned to `terminated` because they disappeared.
    pub assets_removed: usize,
    /// Scope and per-asset failures, collected rather than fatal.
    pub errors: Vec<String>,
    /// Wall-clock duration of the reconciliation pass.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl SyncResult {
    fn empty(tenant_id: TenantId, platform: Platform) -> Self {
        Self {
            tenant_id,
            platform,
            assets_found: 0,
            assets_new: 0,
            assets_updated: 0,
            assets_removed: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Whether the run completed without any collected failure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// The diff/upsert/terminate engine.
pub struct SyncEngine {
    store: Arc<dyn AssetStore>,
}

impl SyncEngine {
    /// Create an engine over the given store.
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }

    /// Reconcile one discovery batch.
    ///
    /// Never fails as a call: store problems are collected into
    /// [`SyncResult::errors`]. A failed upsert leaves the asset's previous
    /// record untouched — in particular it is never marked terminated,
    /// because the asset did appear in this batch. When the initial stored
    /// load fails the whole pass is abandoned (upserting without the
    /// termination sweep would leave a half-updated view).
    #[instrument(skip(self, discovery), fields(tenant_id = %tenant_id, platform = %platform))]
    pub async fn sync(
        &self,
        tenant_id: TenantId,
        platform: Platform,
        discovery: Discovery,
    ) -> SyncResult {
        let started = Instant::now();
        let mut result = SyncResult::empty(tenant_id, platform);

        for failure in &discovery.scope_failures {
            result.errors.push(failure.to_string());
        }

        // Step 1: the stored view, loaded up front so upserts and the
        // termination sweep see one consistent pass.
        let stored = match self.store.list_assets_by_platform(tenant_id, platform).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, "Cannot load stored assets, abandoning reconciliation pass");
                result.errors.push(format!("load stored assets: {e}"));
                result.duration = started.elapsed();
                return result;
            }
        };

        // Step 2: upsert everything discovered.
        result.assets_found = discovery.assets.len();
        let mut seen: HashSet<String> = HashSet::with_capacity(discovery.assets.len());

        for asset in discovery.assets {
            let instance_id = asset.instance_id.clone();
            seen.insert(instance_id.clone());

            match self
                .store
                .upsert_asset(tenant_id, platform, &instance_id, AssetFields::from(asset))
                .await
            {
                Ok(outcome) if outcome.was_new => result.assets_new += 1,
                Ok(_) => result.assets_updated += 1,
                Err(e) => {
                    warn!(instance_id = %instance_id, error = %e, "Asset upsert failed");
                    result.errors.push(format!("upsert {instance_id}: {e}"));
                }
            }
        }

        // Step 3: anything stored but unseen this run has disappeared from
        // the platform.
        for asset in stored {
            if seen.contains(&asset.instance_id) || !asset.state.is_present() {
                continue;
            }
            match self.store.mark_asset_terminated(asset.id).await {
                Ok(()) => result.assets_removed += 1,
                Err(e) => {
                    warn!(instance_id = %asset.instance_id, error = %e, "Termination mark failed");
                    result
                        .errors
                        .push(format!("terminate {}: {e}", asset.instance_id));
                }
            }
        }

        result.duration = started.elapsed();
        info!(
            assets_found = result.assets_found,
            assets_new = result.assets_new,
            assets_updated = result.assets_updated,
            assets_removed = result.assets_removed,
            error_count = result.errors.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Reconciliation pass complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAssetStore;
    use muster_connector::asset::NormalizedAsset;
    use muster_connector::types::AssetState;

    fn asset(instance_id: &str, state: AssetState) -> NormalizedAsset {
        NormalizedAsset::new(Platform::Aws, "123456789012", "us-east-1", instance_id)
            .with_state(state)
    }

    fn discovery_of(assets: Vec<NormalizedAsset>) -> Discovery {
        let mut discovery = Discovery::new();
        for a in assets {
            discovery.push_asset(a);
        }
        discovery
    }

    #[tokio::test]
    async fn first_run_inserts_everything() {
        let store = Arc::new(InMemoryAssetStore::new());
        let engine = SyncEngine::new(store.clone());
        let tenant = TenantId::new();

        let result = engine
            .sync(
                tenant,
                Platform::Aws,
                discovery_of(vec![
                    asset("i-1", AssetState::Running),
                    asset("i-2", AssetState::Running),
                ]),
            )
            .await;

        assert_eq!(result.assets_found, 2);
        assert_eq!(result.assets_new, 2);
        assert_eq!(result.assets_updated, 0);
        assert_eq!(result.assets_removed, 0);
        assert!(result.is_clean());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn scope_failures_surface_in_errors() {
        let engine = SyncEngine::new(Arc::new(InMemoryAssetStore::new()));
        let mut discovery = discovery_of(vec![asset("i-1", AssetState::Running)]);
        discovery.fail_scope("eu-west-1", "throttled");

        let result = engine.sync(TenantId::new(), Platform::Aws, discovery).await;
        assert_eq!(result.assets_new, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("eu-west-1"));
    }

    #[tokio::test]
    async fn duplicate_instance_ids_upsert_once() {
        let store = Arc::new(InMemoryAssetStore::new());
        let engine = SyncEngine::new(store.clone());

        let result = engine
            .sync(
                TenantId::new(),
                Platform::Aws,
                discovery_of(vec![
                    asset("i-1", AssetState::Pending),
                    asset("i-1", AssetState::Running),
                ]),
            )
            .await;

        // Second occurrence lands as an update of the first.
        assert_eq!(result.assets_found, 2);
        assert_eq!(result.assets_new, 1);
        assert_eq!(result.assets_updated, 1);
        assert_eq!(store.len().await, 1);
    }
}
