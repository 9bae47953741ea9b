//! Kubernetes connector for the muster fleet inventory.
//!
//! Normalizes pods (and optionally nodes) from one cluster's API server
//! into canonical assets. Pod identity is the cluster-scoped `metadata.uid`
//! — never the pod name, which is reused by controllers.

pub mod config;
pub mod connector;

pub use config::KubernetesConfig;
pub use connector::KubernetesConnector;
