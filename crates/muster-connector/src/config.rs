//! Shared connector configuration types.
//!
//! Each connector crate defines its own configuration struct and implements
//! [`ConnectorConfig`]; the common pieces (timeouts, authentication) live
//! here. Configuration is supplied once at connector construction and is
//! immutable for the connector's lifetime.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ConnectorResult;
use crate::types::Platform;

/// Trait implemented by every platform-specific configuration struct.
pub trait ConnectorConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The platform this configuration is for.
    fn platform() -> Platform;

    /// Validate the configuration, returning `InvalidConfiguration` on the
    /// first problem found.
    fn validate(&self) -> ConnectorResult<()>;

    /// A copy safe for logging and display: credentials replaced with
    /// placeholders.
    fn redacted(&self) -> Self;
}

/// Connection timeouts shared by every connector.
///
/// The read timeout bounds how long a hung platform can hold a scheduler
/// concurrency slot, so it must stay in the tens of seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// TCP/TLS connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-request read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl ConnectionSettings {
    /// Connect timeout as a [`std::time::Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a [`std::time::Duration`].
    #[must_use]
    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.read_timeout_secs)
    }
}

/// Authentication method for connectors that speak HTTPS to their platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication (local development endpoints).
    #[default]
    None,

    /// Username and password.
    Basic {
        username: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },

    /// Static bearer token (service-account token, pre-issued credential).
    Bearer { token: String },

    /// OAuth2 client-credentials flow; the token is fetched on connect and
    /// cached for the session.
    #[serde(rename = "oauth2")]
    OAuth2 {
        token_url: String,
        client_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        #[serde(default)]
        scopes: Vec<String>,
    },
}

impl AuthConfig {
    /// Create basic authentication config.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        AuthConfig::Basic {
            username: username.into(),
            password: Some(password.into()),
        }
    }

    /// Create bearer token config.
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthConfig::Bearer {
            token: token.into(),
        }
    }

    /// Create OAuth2 client-credentials config.
    pub fn oauth2(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        AuthConfig::OAuth2 {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: Some(client_secret.into()),
            scopes: Vec::new(),
        }
    }

    /// A copy with secrets replaced by placeholders.
    #[must_use]
    pub fn redacted(&self) -> Self {
        match self {
            AuthConfig::None => AuthConfig::None,
            AuthConfig::Basic { username, .. } => AuthConfig::Basic {
                username: username.clone(),
                password: Some("***REDACTED***".to_string()),
            },
            AuthConfig::Bearer { .. } => AuthConfig::Bearer {
                token: "***REDACTED***".to_string(),
            },
            AuthConfig::OAuth2 {
                token_url,
                client_id,
                scopes,
                ..
            } => AuthConfig::OAuth2 {
                token_url: token_url.clone(),
                client_id: client_id.clone(),
                client_secret: Some("***REDACTED***".to_string()),
                scopes: scopes.clone(),
            },
        }
    }
}
