//! Azure connector for the muster fleet inventory.
//!
//! Enumerates Resource Manager virtual machines per resource group and
//! normalizes them into canonical assets, keyed by the immutable `vmId`.

pub mod config;
pub mod connector;

pub use config::AzureConfig;
pub use connector::AzureConnector;
