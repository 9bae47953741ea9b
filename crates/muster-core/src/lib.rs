//! # muster-core
//!
//! Shared, strongly-typed identifiers for the muster fleet inventory.
//!
//! Every crate in the workspace refers to tenants and stored assets through
//! the newtypes defined here rather than raw [`uuid::Uuid`] values, so the
//! compiler rejects an asset id where a tenant id is expected.

pub mod ids;

pub use ids::{AssetId, ParseIdError, TenantId};
