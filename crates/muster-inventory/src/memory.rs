//! In-memory reference store.
//!
//! The production store lives outside this workspace; this implementation
//! backs tests and small single-process deployments, and doubles as the
//! executable definition of the contract's semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use muster_connector::types::{AssetState, Platform};
use muster_core::{AssetId, TenantId};

use crate::store::{AssetFields, AssetStore, StoreError, StoreResult, StoredAsset, UpsertOutcome};

type IdentityKey = (TenantId, Platform, String);

/// Thread-safe in-memory [`AssetStore`].
#[derive(Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<IdentityKey, StoredAsset>>,
}

impl InMemoryAssetStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records, terminated included.
    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }

    /// Fetch one record by its identity triple.
    pub async fn get(
        &self,
        tenant_id: TenantId,
        platform: Platform,
        instance_id: &str,
    ) -> Option<StoredAsset> {
        self.assets
            .read()
            .await
            .get(&(tenant_id, platform, instance_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn upsert_asset(
        &self,
        tenant_id: TenantId,
        platform: Platform,
        instance_id: &str,
        fields: AssetFields,
    ) -> StoreResult<UpsertOutcome> {
        let mut assets = self.assets.write().await;
        let key = (tenant_id, platform, instance_id.to_string());
        let now = Utc::now();

        match assets.get_mut(&key) {
            Some(existing) => {
                existing.account = fields.account;
                existing.region = fields.region;
                existing.name = fields.name;
                existing.image_ref = fields.image_ref;
                existing.image_version = fields.image_version;
                existing.state = fields.state;
                existing.tags = fields.tags;
                existing.updated_at = now;
                Ok(UpsertOutcome {
                    asset: existing.clone(),
                    was_new: false,
                })
            }
            None => {
                let asset = StoredAsset {
                    id: AssetId::new(),
                    tenant_id,
                    platform,
                    instance_id: instance_id.to_string(),
                    account: fields.account,
                    region: fields.region,
                    name: fields.name,
                    image_ref: fields.image_ref,
                    image_version: fields.image_version,
                    state: fields.state,
                    tags: fields.tags,
                    discovered_at: now,
                    updated_at: now,
                };
                assets.insert(key, asset.clone());
                Ok(UpsertOutcome {
                    asset,
                    was_new: true,
                })
            }
        }
    }

    async fn list_assets_by_platform(
        &self,
        tenant_id: TenantId,
        platform: Platform,
    ) -> StoreResult<Vec<StoredAsset>> {
        Ok(self
            .assets
            .read()
            .await
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.platform == platform)
            .cloned()
            .collect())
    }

    async fn mark_asset_terminated(&self, id: AssetId) -> StoreResult<()> {
        let mut assets = self.assets.write().await;
        let asset = assets
            .values_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound { id })?;
        asset.state = AssetState::Terminated;
        asset.updated_at = Utc::now();
        Ok(())
    }
}
