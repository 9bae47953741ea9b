//! Connector error taxonomy.
//!
//! Errors carry a transient/permanent classification so the scheduler can
//! tell a platform outage (retry next tick) from a configuration problem
//! (fails every tick until an operator intervenes).

use thiserror::Error;

/// Error that can occur during connector operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Could not establish a session: auth failure, unreachable endpoint,
    /// or a rejected handshake. Fatal to the current run; the connector
    /// stays disconnected until the next scheduled attempt.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The platform did not answer within the configured timeout.
    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    /// An operation was attempted before a successful `connect`.
    #[error("connector is not connected")]
    NotConnected,

    /// Total enumeration failure: the platform could not be listed at all,
    /// or too many sub-scopes failed to trust the result.
    #[error("discovery failed: {message}")]
    DiscoveryFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// One sub-scope (namespace, region, resource group, datacenter)
    /// failed to enumerate. Recorded and skipped, never propagated as a
    /// run failure on its own.
    #[error("scope '{scope}' failed: {message}")]
    PartialScope { scope: String, message: String },

    /// The liveness probe failed on a connected session.
    #[error("health check failed: {message}")]
    HealthCheckFailed { message: String },

    /// Connector configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A platform response could not be decoded.
    #[error("malformed platform response: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Whether the error is caused by a temporary condition that the next
    /// scheduled run may not hit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::DiscoveryFailed { .. }
                | ConnectorError::PartialScope { .. }
                | ConnectorError::HealthCheckFailed { .. }
        )
    }

    /// Whether retrying without operator intervention is pointless.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable code for log aggregation.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::NotConnected => "NOT_CONNECTED",
            ConnectorError::DiscoveryFailed { .. } => "DISCOVERY_FAILED",
            ConnectorError::PartialScope { .. } => "PARTIAL_SCOPE",
            ConnectorError::HealthCheckFailed { .. } => "HEALTH_CHECK_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with an underlying cause.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a discovery failed error.
    pub fn discovery_failed(message: impl Into<String>) -> Self {
        ConnectorError::DiscoveryFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a discovery failed error with an underlying cause.
    pub fn discovery_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::DiscoveryFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a partial scope error.
    pub fn partial_scope(scope: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::PartialScope {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Create a health check failed error.
    pub fn health_check_failed(message: impl Into<String>) -> Self {
        ConnectorError::HealthCheckFailed {
            message: message.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        ConnectorError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        ConnectorError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
