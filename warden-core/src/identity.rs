//! Identity types for gateway requests
//!
//! Tenant and user handles are UUIDv7 newtypes. A `TenantContext` is only
//! ever constructed by the credential resolver after a store lookup - request
//! handlers never build one from caller-supplied identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declare a UUIDv7-backed identifier newtype.
macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wrap an existing UUID.
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh timestamp-sortable identifier.
            pub fn now_v7() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the inner UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id! {
    /// Opaque fixed-length tenant handle.
    TenantId
}

define_id! {
    /// User handle bound to a tenant.
    UserId
}

define_id! {
    /// Per-request correlation identifier, echoed in deny responses and
    /// audit records.
    RequestId
}

// ============================================================================
// REQUEST-SCOPED CONTEXTS
// ============================================================================

/// Tenant context resolved once per request.
///
/// Immutable after resolution. The `active` flag mirrors the store row at
/// resolution time; an inactive tenant never reaches the validation paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: TenantId,
    /// Human business key (account slug), used in logs instead of the UUID.
    pub business_key: String,
    pub active: bool,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId, business_key: impl Into<String>, active: bool) -> Self {
        Self {
            tenant_id,
            business_key: business_key.into(),
            active,
        }
    }
}

/// User context for credentials bound to a specific user.
///
/// Absent for tenant-only (service) credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
}

impl UserContext {
    pub fn new(user_id: UserId, tenant_id: TenantId) -> Self {
        Self { user_id, tenant_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_through_string() {
        let id = TenantId::now_v7();
        let parsed: TenantId = id.to_string().parse().expect("valid uuid string");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_distinct_types() {
        let uuid = Uuid::now_v7();
        let tenant = TenantId::new(uuid);
        let user = UserId::new(uuid);
        assert_eq!(tenant.as_uuid(), user.as_uuid());
    }

    #[test]
    fn test_tenant_context_construction() {
        let tenant_id = TenantId::now_v7();
        let ctx = TenantContext::new(tenant_id, "acme-corp", true);
        assert_eq!(ctx.tenant_id, tenant_id);
        assert_eq!(ctx.business_key, "acme-corp");
        assert!(ctx.active);
    }
}
