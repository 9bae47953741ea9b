//! # muster-inventory
//!
//! The reconciliation half of the discovery pipeline: the store contract,
//! the diff/upsert/terminate engine, and the polling scheduler that drives
//! connectors safely.
//!
//! Control flow: [`DiscoveryScheduler`](scheduler::DiscoveryScheduler)
//! ticks a connector → `discover_assets` → [`SyncEngine`](sync::SyncEngine)
//! diffs against the store → upserts and terminations → a
//! [`SyncResult`](sync::SyncResult) is published.
//!
//! The store is external; [`InMemoryAssetStore`](memory::InMemoryAssetStore)
//! is the reference implementation used in tests and small deployments.

pub mod memory;
pub mod scheduler;
pub mod store;
pub mod sync;

pub use memory::InMemoryAssetStore;
pub use scheduler::{
    parse_interval, DiscoveryScheduler, JobState, JobStatus, SchedulerConfig,
    DEFAULT_POLL_INTERVAL,
};
pub use store::{AssetFields, AssetStore, StoreError, StoreResult, StoredAsset, UpsertOutcome};
pub use sync::{SyncEngine, SyncResult};
