//! Strongly typed identifiers.
//!
//! Newtype wrappers over [`Uuid`] for the identities that cross crate
//! boundaries. The wrappers serialize as plain UUID strings.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier fails to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The identifier type that failed to parse.
    pub id_type: &'static str,
    /// The underlying UUID parse error message.
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier (UUID v4).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    message: e.to_string(),
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier for a tenant.
    ///
    /// Discovery, reconciliation, and storage are all scoped per tenant;
    /// the `(tenant, platform, instance_id)` triple is the sole asset
    /// identity used across discovery runs.
    TenantId
);

define_id!(
    /// Store-assigned identifier for a persisted asset record.
    ///
    /// Assigned on first sight of an asset identity and stable for the
    /// record's lifetime, including after the asset is marked terminated.
    AssetId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(TenantId::new(), TenantId::new());
        assert_ne!(AssetId::new(), AssetId::new());
    }

    #[test]
    fn from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        assert_eq!(TenantId::from_uuid(uuid).as_uuid(), uuid);
    }

    #[test]
    fn display_is_uuid_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let id = AssetId::from_uuid(uuid);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn parse_roundtrip() {
        let id = TenantId::new();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_invalid_reports_type() {
        let err = "not-a-uuid".parse::<TenantId>().unwrap_err();
        assert_eq!(err.id_type, "TenantId");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn serializes_as_plain_string() {
        let uuid = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_string(&TenantId::from_uuid(uuid)).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }

    #[test]
    fn usable_as_map_key() {
        let mut map = std::collections::HashMap::new();
        let id = TenantId::new();
        map.insert(id, "acme");
        assert_eq!(map.get(&id), Some(&"acme"));
    }
}
