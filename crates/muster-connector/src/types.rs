//! Platform and lifecycle enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Infrastructure platform a connector talks to.
///
/// Shared logic never branches on these values; adding a platform means
/// adding a connector crate, not another match arm in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Kubernetes container orchestrator (pods and nodes).
    Kubernetes,
    /// Amazon Web Services (EC2 instances).
    Aws,
    /// Microsoft Azure (Resource Manager virtual machines).
    Azure,
    /// Google Cloud Platform (Compute Engine instances).
    Gcp,
    /// VMware vSphere (vCenter-managed virtual machines).
    Vsphere,
}

impl Platform {
    /// All supported platforms.
    #[must_use]
    pub fn all() -> &'static [Platform] {
        &[
            Platform::Kubernetes,
            Platform::Aws,
            Platform::Azure,
            Platform::Gcp,
            Platform::Vsphere,
        ]
    }

    /// Stable string form used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kubernetes => "kubernetes",
            Platform::Aws => "aws",
            Platform::Azure => "azure",
            Platform::Gcp => "gcp",
            Platform::Vsphere => "vsphere",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ParsePlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "kubernetes" => Ok(Platform::Kubernetes),
            "aws" => Ok(Platform::Aws),
            "azure" => Ok(Platform::Azure),
            "gcp" => Ok(Platform::Gcp),
            "vsphere" => Ok(Platform::Vsphere),
            _ => Err(ParsePlatformError(s.to_string())),
        }
    }
}

/// Error parsing a platform from a string.
#[derive(Debug, Clone)]
pub struct ParsePlatformError(String);

impl fmt::Display for ParsePlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid platform '{}', expected one of: kubernetes, aws, azure, gcp, vsphere",
            self.0
        )
    }
}

impl std::error::Error for ParsePlatformError {}

/// Normalized asset lifecycle state.
///
/// Every connector maps its platform's native status vocabulary into this
/// set with an explicit match. A native value the connector does not
/// recognize maps to [`AssetState::Unknown`] — never to a default that
/// implies health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    /// The resource is up and serving.
    Running,
    /// The resource is being created or started.
    Pending,
    /// The resource exists but is powered off / not scheduled.
    Stopped,
    /// The resource is gone, or was observed missing by reconciliation.
    Terminated,
    /// The platform reported a state outside the mapped vocabulary.
    #[default]
    Unknown,
}

impl AssetState {
    /// Stable string form used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetState::Running => "running",
            AssetState::Pending => "pending",
            AssetState::Stopped => "stopped",
            AssetState::Terminated => "terminated",
            AssetState::Unknown => "unknown",
        }
    }

    /// Whether the asset is still considered present on its platform.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, AssetState::Terminated)
    }
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetState {
    type Err = ParseAssetStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(AssetState::Running),
            "pending" => Ok(AssetState::Pending),
            "stopped" => Ok(AssetState::Stopped),
            "terminated" => Ok(AssetState::Terminated),
            "unknown" => Ok(AssetState::Unknown),
            _ => Err(ParseAssetStateError(s.to_string())),
        }
    }
}

/// Error parsing an asset state from a string.
#[derive(Debug, Clone)]
pub struct ParseAssetStateError(String);

impl fmt::Display for ParseAssetStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid asset state '{}', expected one of: running, pending, stopped, terminated, unknown",
            self.0
        )
    }
}

impl std::error::Error for ParseAssetStateError {}

/// Lifecycle of a connector's session to its platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// `connect` has not run, or the last attempt failed.
    #[default]
    Disconnected,
    /// A live session is held.
    Connected,
    /// `close` released the session; `connect` may re-establish it.
    Closed,
}

impl SessionState {
    /// Whether operations that require a session may proceed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}
