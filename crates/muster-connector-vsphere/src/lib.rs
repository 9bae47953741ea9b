//! vSphere connector for the muster fleet inventory.
//!
//! Enumerates vCenter-managed virtual machines per datacenter and
//! normalizes them into canonical assets, keyed by the VM managed-object
//! reference.

pub mod config;
pub mod connector;

pub use config::VsphereConfig;
pub use connector::VsphereConnector;
