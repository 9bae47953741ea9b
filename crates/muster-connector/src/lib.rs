//! # Connector framework
//!
//! Core abstractions for discovering compute resources across
//! heterogeneous infrastructure platforms and normalizing them into one
//! canonical asset model.
//!
//! ## Architecture
//!
//! - [`Connector`](traits::Connector) — the per-platform contract:
//!   `connect` / `close` / `health` / `discover_assets` / `discover_images`
//! - [`NormalizedAsset`](asset::NormalizedAsset) — the platform-agnostic
//!   shape every connector produces
//! - [`ConnectorRegistry`](registry::ConnectorRegistry) — the set of
//!   configured, live connectors
//!
//! Platform connectors live in sibling crates
//! (`muster-connector-kubernetes`, `muster-connector-aws`, ...); adding a
//! platform means adding a crate that implements the trait, never adding a
//! platform match inside shared logic.
//!
//! ## Crate organization
//!
//! - [`ids`] — the `ConnectorId` newtype
//! - [`types`] — `Platform`, `AssetState`, `SessionState` enums
//! - [`error`] — error taxonomy with transient/permanent classification
//! - [`asset`] — `NormalizedAsset`, `DiscoveredImage`, tag namespaces
//! - [`image`] — image reference splitting
//! - [`scope`] — include/exclude scope filtering
//! - [`config`] — shared configuration types
//! - [`traits`] — the `Connector` trait and `Discovery` aggregation
//! - [`registry`] — live-connector registry

pub mod asset;
pub mod config;
pub mod error;
pub mod ids;
pub mod image;
pub mod registry;
pub mod scope;
pub mod traits;
pub mod types;

/// Prelude for connector implementations and consumers.
pub mod prelude {
    pub use crate::asset::{
        DiscoveredImage, NormalizedAsset, TAG_GROUP_PREFIX, TAG_LABEL_PREFIX, TAG_NODE_HOST,
        TAG_OWNER_CONTROLLER, TAG_SPEC_PREFIX,
    };
    pub use crate::config::{AuthConfig, ConnectionSettings, ConnectorConfig};
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::ids::ConnectorId;
    pub use crate::image::split_image_reference;
    pub use crate::registry::{BoxedConnector, ConnectorRegistry};
    pub use crate::scope::ScopeFilter;
    pub use crate::traits::{Connector, Discovery, ScopeFailure, MAX_SCOPE_FAILURE_RATIO};
    pub use crate::types::{AssetState, Platform, SessionState};
}

// Re-exported for connector implementors.
pub use async_trait::async_trait;
