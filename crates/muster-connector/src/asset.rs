//! Canonical asset model.
//!
//! Every connector normalizes its platform's resources into
//! [`NormalizedAsset`]; downstream code never sees a pod, an EC2 instance,
//! or a vSphere VM directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AssetState, Platform};

/// Tag prefix for platform-native labels and tags.
pub const TAG_LABEL_PREFIX: &str = "label:";
/// Tag key for the owning controller (ReplicaSet, scaling group, ...).
pub const TAG_OWNER_CONTROLLER: &str = "owner:controller";
/// Tag key for the node or host the asset is placed on.
pub const TAG_NODE_HOST: &str = "node:host";
/// Tag prefix for hardware sizing (instance type, cpus, memory).
pub const TAG_SPEC_PREFIX: &str = "spec:";
/// Tag prefix for platform grouping constructs (resource group, zone).
pub const TAG_GROUP_PREFIX: &str = "group:";

/// A compute resource in the platform-agnostic shape all connectors produce.
///
/// Identity across discovery runs is `(tenant, platform, instance_id)`;
/// everything else is a mutable attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAsset {
    /// Platform the producing connector talks to.
    pub platform: Platform,
    /// Platform-level scope: cluster name, account/subscription/project id,
    /// or management endpoint host.
    pub account: String,
    /// Closest locality analogue: namespace, cloud region, or datacenter.
    pub region: String,
    /// Platform-unique, stable resource identifier. Never a name.
    pub instance_id: String,
    /// Best-effort human label; may be empty.
    #[serde(default)]
    pub name: String,
    /// Base image or template reference, without the version part.
    #[serde(default)]
    pub image_ref: String,
    /// Version/tag/digest part of the image reference.
    #[serde(default)]
    pub image_version: String,
    /// Normalized lifecycle state.
    pub state: AssetState,
    /// Namespaced open tags: platform labels plus connector enrichment.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl NormalizedAsset {
    /// Create an asset with the identity fields set and everything else
    /// empty or unknown.
    pub fn new(
        platform: Platform,
        account: impl Into<String>,
        region: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            account: account.into(),
            region: region.into(),
            instance_id: instance_id.into(),
            name: String::new(),
            image_ref: String::new(),
            image_version: String::new(),
            state: AssetState::Unknown,
            tags: BTreeMap::new(),
        }
    }

    /// Set the human label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the image reference and version.
    #[must_use]
    pub fn with_image(mut self, reference: impl Into<String>, version: impl Into<String>) -> Self {
        self.image_ref = reference.into();
        self.image_version = version.into();
        self
    }

    /// Set the lifecycle state.
    #[must_use]
    pub fn with_state(mut self, state: AssetState) -> Self {
        self.state = state;
        self
    }

    /// Add a single tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a platform label under the `label:` namespace.
    pub fn add_label(&mut self, key: &str, value: impl Into<String>) {
        self.tags.insert(format!("{TAG_LABEL_PREFIX}{key}"), value.into());
    }

    /// Record the owning controller under `owner:controller`.
    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.tags.insert(TAG_OWNER_CONTROLLER.to_string(), owner.into());
    }

    /// Record node/host placement under `node:host`.
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.tags.insert(TAG_NODE_HOST.to_string(), host.into());
    }

    /// Record a hardware-sizing attribute under the `spec:` namespace.
    pub fn add_spec(&mut self, key: &str, value: impl Into<String>) {
        self.tags.insert(format!("{TAG_SPEC_PREFIX}{key}"), value.into());
    }
}

/// A platform-native template or base image, as returned by
/// `Connector::discover_images`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredImage {
    /// Platform the image lives on.
    pub platform: Platform,
    /// Platform-level scope that owns the image.
    pub account: String,
    /// Image reference, without the version part.
    pub image_ref: String,
    /// Version/tag/digest part of the reference.
    #[serde(default)]
    pub image_version: String,
    /// Best-effort human label; may be empty.
    #[serde(default)]
    pub name: String,
    /// Platform labels/tags, namespaced like asset tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl DiscoveredImage {
    /// Create an image record with empty name and tags.
    pub fn new(
        platform: Platform,
        account: impl Into<String>,
        image_ref: impl Into<String>,
        image_version: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            account: account.into(),
            image_ref: image_ref.into(),
            image_version: image_version.into(),
            name: String::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Set the human label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
