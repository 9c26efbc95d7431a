//! Store seams.
//!
//! The resolver, ownership validator, and audit recorder all talk to
//! the relational store through these traits so the validation engine
//! can be exercised against in-memory fakes in tests.

use async_trait::async_trait;
use warden_core::{
    Credential, CredentialRecord, GatewayResult, TableBinding, TenantContext, TenantId,
    ValidationAttempt,
};

/// Credential and tenant lookups.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the stored record for a presented credential.
    ///
    /// Implementations look up by the credential's fingerprint; the raw
    /// value must never be sent to the store or appear in a query.
    async fn fetch_credential(
        &self,
        credential: &Credential,
    ) -> GatewayResult<Option<CredentialRecord>>;

    /// Fetch a tenant's context row.
    async fn fetch_tenant(&self, tenant_id: TenantId) -> GatewayResult<Option<TenantContext>>;

    /// Slide a live session token's expiry window forward. Returns true
    /// when the store actually extended it. Stores without sliding
    /// sessions keep the deadline fixed.
    async fn extend_session(&self, _credential: &Credential) -> GatewayResult<bool> {
        Ok(false)
    }
}

/// Row-level ownership checks against one registered table binding.
#[async_trait]
pub trait OwnershipProbe: Send + Sync {
    /// Whether a row with this id exists under this tenant.
    async fn row_owned_by_tenant(
        &self,
        binding: &TableBinding,
        resource_id: &str,
        tenant_id: TenantId,
    ) -> GatewayResult<bool>;

    /// Whether a row with this id exists at all, regardless of tenant.
    ///
    /// Used to distinguish a cross-tenant hit (row exists elsewhere)
    /// from a plain miss when shaping the violation.
    async fn row_exists(&self, binding: &TableBinding, resource_id: &str) -> GatewayResult<bool>;
}

/// Audit persistence.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a batch of validation attempts.
    async fn record_attempts(&self, attempts: &[ValidationAttempt]) -> GatewayResult<()>;
}
