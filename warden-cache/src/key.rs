//! Tenant-scoped cache key system.
//!
//! The private constructor makes it impossible to build a key without
//! going through one of the namespace-specific constructors, each of which
//! declares exactly what identifying material goes into the digest. Raw
//! credential bytes never enter a key; only their SHA-256 fingerprint does.

use sha2::{Digest, Sha256};
use warden_core::{ResourceReference, TenantId, UserId};

/// Separator byte between digest components.
const SEPARATOR: u8 = 0xFF;

/// Which logical cache a key belongs to.
///
/// Namespaces never collide: the discriminant is the first byte hashed
/// into every digest, so identical material in two namespaces produces
/// two distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Credential fingerprint -> resolved tenant/user identity.
    Validation,
    /// Tenant id -> tenant context (business key, active flag).
    TenantInfo,
    /// (tenant, user, resource) -> ownership decision.
    Permission,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Validation => "validation",
            Namespace::TenantInfo => "tenant_info",
            Namespace::Permission => "permission",
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Namespace::Validation => 0,
            Namespace::TenantInfo => 1,
            Namespace::Permission => 2,
        }
    }
}

/// A cache key carrying a namespace, an optional tenant scope, and a
/// SHA-256 digest of the identifying material.
///
/// # Design
///
/// The tenant scope is kept alongside the digest (not only inside it) so
/// that tenant-wide invalidation can find every key belonging to a tenant
/// without remembering the material that built them. Keys for material
/// that precedes tenant resolution (credential lookups) carry no scope.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    namespace: Namespace,
    tenant: Option<TenantId>,
    digest: [u8; 32],
}

impl CacheKey {
    fn build(namespace: Namespace, tenant: Option<TenantId>, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([namespace.discriminant()]);
        for part in parts {
            hasher.update([SEPARATOR]);
            hasher.update(part);
        }
        Self {
            inner: KeyInner {
                namespace,
                tenant,
                digest: hasher.finalize().into(),
            },
        }
    }

    /// Key for a credential resolution result.
    ///
    /// Takes the credential's hex fingerprint, never the raw secret. The
    /// tenant is unknown at resolution time, so the key is unscoped.
    pub fn credential(fingerprint: &str) -> Self {
        Self::build(Namespace::Validation, None, &[fingerprint.as_bytes()])
    }

    /// Key for a cached tenant context.
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self::build(
            Namespace::TenantInfo,
            Some(tenant_id),
            &[tenant_id.as_uuid().as_bytes()],
        )
    }

    /// Key for a cached ownership decision.
    pub fn permission(tenant_id: TenantId, user_id: UserId, resource: &ResourceReference) -> Self {
        Self::build(
            Namespace::Permission,
            Some(tenant_id),
            &[
                tenant_id.as_uuid().as_bytes(),
                user_id.as_uuid().as_bytes(),
                resource.resource_type.as_bytes(),
                resource.resource_id.as_bytes(),
            ],
        )
    }

    pub fn namespace(&self) -> Namespace {
        self.inner.namespace
    }

    /// The tenant this key is scoped to, when known at construction.
    pub fn tenant_scope(&self) -> Option<TenantId> {
        self.inner.tenant
    }
}

impl std::fmt::Debug for CacheKey {
    /// Shows the namespace and a digest prefix only; enough to correlate
    /// log lines without leaking identifying material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CacheKey({}, {})",
            self.inner.namespace.as_str(),
            &hex::encode(self.inner.digest)[..8]
        )
    }
}
