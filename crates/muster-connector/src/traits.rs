//! The connector contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use muster_core::TenantId;

use crate::asset::{DiscoveredImage, NormalizedAsset};
use crate::error::{ConnectorError, ConnectorResult};
use crate::types::Platform;

/// Share of failed scopes above which a discovery run is no longer
/// trustworthy and converts into a total `DiscoveryFailed` error.
pub const MAX_SCOPE_FAILURE_RATIO: f64 = 0.5;

/// One platform sub-scope that failed to enumerate during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFailure {
    /// The scope that failed (namespace, region, resource group, ...).
    pub scope: String,
    /// What went wrong.
    pub message: String,
}

impl std::fmt::Display for ScopeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scope '{}': {}", self.scope, self.message)
    }
}

/// The output of one `discover_assets` call: the assets that were found
/// plus the sub-scopes that could not be enumerated.
///
/// Connectors push a [`ScopeFailure`] and keep going instead of failing the
/// whole call; the reconciliation engine copies the failures into
/// `SyncResult.errors` for visibility.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Assets found across all scopes that enumerated successfully.
    pub assets: Vec<NormalizedAsset>,
    /// Scopes that failed and were skipped.
    pub scope_failures: Vec<ScopeFailure>,
}

impl Discovery {
    /// An empty discovery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one discovered asset.
    pub fn push_asset(&mut self, asset: NormalizedAsset) {
        self.assets.push(asset);
    }

    /// Record a failed scope and continue.
    pub fn fail_scope(&mut self, scope: impl Into<String>, message: impl Into<String>) {
        self.scope_failures.push(ScopeFailure {
            scope: scope.into(),
            message: message.into(),
        });
    }

    /// Convert into a result, failing the run when more than
    /// [`MAX_SCOPE_FAILURE_RATIO`] of `total_scopes` failed.
    ///
    /// With zero total scopes (nothing to enumerate) the discovery is
    /// trivially successful.
    pub fn into_result(self, total_scopes: usize) -> ConnectorResult<Discovery> {
        if total_scopes > 0 {
            let failed = self.scope_failures.len() as f64;
            if failed / total_scopes as f64 > MAX_SCOPE_FAILURE_RATIO {
                return Err(ConnectorError::discovery_failed(format!(
                    "{} of {} scopes failed to enumerate",
                    self.scope_failures.len(),
                    total_scopes
                )));
            }
        }
        Ok(self)
    }
}

/// Contract implemented once per platform.
///
/// A connector is stateful: it owns a live session to its platform with a
/// `disconnected → connected → closed` lifecycle, and a single instance is
/// never used for concurrent discovery calls — the scheduler serializes
/// per-connector work.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The platform this connector talks to.
    fn platform(&self) -> Platform;

    /// Human-readable name for logs and the registry.
    fn display_name(&self) -> &str;

    /// The platform-level scope this connector covers (cluster name,
    /// account id, management endpoint host).
    fn account(&self) -> &str;

    /// Establish a session using the configuration supplied at
    /// construction.
    ///
    /// Fails with `ConnectionFailed` on auth failure, unreachable endpoint,
    /// or malformed configuration. Safe to call again after a failure or a
    /// `close`.
    async fn connect(&self) -> ConnectorResult<()>;

    /// Release the session. Always safe to call, including on a connector
    /// that never connected or is already closed.
    async fn close(&self) -> ConnectorResult<()>;

    /// Lightweight liveness probe against the live session.
    ///
    /// Fails with `NotConnected` when `connect` was never called or did not
    /// succeed, and `HealthCheckFailed` when the probe itself fails.
    async fn health(&self) -> ConnectorResult<()>;

    /// Enumerate the platform's current compute resources.
    ///
    /// One failed sub-scope never fails the call: it is logged, recorded in
    /// [`Discovery::scope_failures`], and enumeration continues. A total
    /// enumeration failure returns `DiscoveryFailed`. Implementations check
    /// `cancel` in every per-scope loop and return promptly with whatever
    /// was collected; the caller discards cancelled results.
    async fn discover_assets(
        &self,
        tenant_id: TenantId,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Discovery>;

    /// Enumerate platform-native templates/base images. Same
    /// partial-failure and cancellation policy as `discover_assets`.
    async fn discover_images(
        &self,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<DiscoveredImage>>;
}
