//! Persistence contract.
//!
//! The inventory store is external; the reconciliation engine consults it
//! only through [`AssetStore`]. The conflict key for upserts is
//! `(tenant, platform, instance_id)` — the same triple that is the asset
//! identity everywhere else.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use muster_connector::asset::NormalizedAsset;
use muster_connector::types::{AssetState, Platform};
use muster_core::{AssetId, TenantId};

/// The mutable attributes written on every upsert.
///
/// Identity fields are passed separately; `discovered_at` is owned by the
/// store and never written through this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFields {
    pub account: String,
    pub region: String,
    pub name: String,
    pub image_ref: String,
    pub image_version: String,
    pub state: AssetState,
    pub tags: BTreeMap<String, String>,
}

impl From<NormalizedAsset> for AssetFields {
    fn from(asset: NormalizedAsset) -> Self {
        Self {
            account: asset.account,
            region: asset.region,
            name: asset.name,
            image_ref: asset.image_ref,
            image_version: asset.image_version,
            state: asset.state,
            tags: asset.tags,
        }
    }
}

/// A persisted asset record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAsset {
    /// Store-assigned record id.
    pub id: AssetId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Producing platform.
    pub platform: Platform,
    /// Platform-unique identity, stable across runs.
    pub instance_id: String,
    pub account: String,
    pub region: String,
    pub name: String,
    pub image_ref: String,
    pub image_version: String,
    pub state: AssetState,
    pub tags: BTreeMap<String, String>,
    /// Set once, on first sight. Never overwritten.
    pub discovered_at: DateTime<Utc>,
    /// Bumped on every successful upsert.
    pub updated_at: DateTime<Utc>,
}

/// Result of one upsert: the record as persisted plus whether it was
/// created by this call.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub asset: StoredAsset,
    pub was_new: bool,
}

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A single-row write failed.
    #[error("upsert failed: {message}")]
    Upsert { message: String },

    /// The referenced record does not exist.
    #[error("asset not found: {id}")]
    NotFound { id: AssetId },

    /// The backing store itself failed.
    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Create an upsert error.
    pub fn upsert(message: impl Into<String>) -> Self {
        StoreError::Upsert {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The contract the reconciliation engine consumes.
///
/// Implementations must keep `(tenant, platform, instance_id)` unique and
/// must preserve `discovered_at` on update.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Insert or update by the identity triple. On update, only the
    /// mutable [`AssetFields`] and `updated_at` change.
    async fn upsert_asset(
        &self,
        tenant_id: TenantId,
        platform: Platform,
        instance_id: &str,
        fields: AssetFields,
    ) -> StoreResult<UpsertOutcome>;

    /// All stored assets for one `(tenant, platform)`, terminated records
    /// included.
    async fn list_assets_by_platform(
        &self,
        tenant_id: TenantId,
        platform: Platform,
    ) -> StoreResult<Vec<StoredAsset>>;

    /// Soft-delete: set the record's state to `terminated`. The record and
    /// its history stay in place.
    async fn mark_asset_terminated(&self, id: AssetId) -> StoreResult<()>;
}
