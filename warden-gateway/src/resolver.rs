//! Credential resolution.
//!
//! Cache-first mapping from a presented credential to its tenant and
//! user identity. Expiry and revocation are re-checked on every request
//! even for cached records, so a cached entry can never outlive the
//! credential it describes by more than its own fields allow.

use crate::store::CredentialStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_cache::{CacheKey, ValidationCache};
use warden_core::{
    Credential, CredentialFailure, CredentialKind, CredentialRecord, GatewayError, GatewayResult,
    TenantContext,
};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: CredentialRecord,
    pub tenant: TenantContext,
    /// Whether the credential record came from cache.
    pub cache_hit: bool,
    /// Whether this resolution slid a session token's expiry forward.
    pub token_extended: bool,
}

pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cache: Arc<ValidationCache>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, cache: Arc<ValidationCache>) -> Self {
        Self { store, cache }
    }

    /// Resolve a credential to its tenant and user identity.
    pub async fn resolve(&self, credential: &Credential) -> GatewayResult<Resolution> {
        if !credential.is_well_formed() {
            return Err(GatewayError::credential(CredentialFailure::Malformed));
        }

        let fingerprint = credential.fingerprint();
        let key = CacheKey::credential(&fingerprint);

        let (record, cache_hit) = match self.cache.validation().get(&key) {
            Some(record) => (record, true),
            None => {
                let Some(record) = self.store.fetch_credential(credential).await? else {
                    debug!(kind = %credential.kind(), "credential not found");
                    return Err(GatewayError::credential(CredentialFailure::Unknown));
                };
                (record, false)
            }
        };

        if record.revoked {
            self.cache.validation().invalidate(&key);
            warn!(kind = %credential.kind(), "revoked credential presented");
            return Err(GatewayError::credential(CredentialFailure::Revoked));
        }
        if record.is_expired(Utc::now()) {
            self.cache.validation().invalidate(&key);
            return Err(GatewayError::credential(CredentialFailure::Expired));
        }

        let tenant = self.resolve_tenant(&record).await?;
        if !tenant.active {
            // Nothing belonging to a deactivated tenant may stay cached.
            self.cache.invalidate_tenant(record.tenant_id);
            warn!(tenant_id = %record.tenant_id, "inactive tenant access attempt");
            return Err(GatewayError::credential(CredentialFailure::TenantInactive));
        }

        if !cache_hit {
            self.cache.validation().insert(key, record.clone());
        }

        // Sessions slide on use, but only on a fresh resolution; a cache
        // hit within the TTL does not write back to the store.
        let token_extended = if !cache_hit
            && matches!(credential.kind(), CredentialKind::SessionToken)
        {
            match self.store.extend_session(credential).await {
                Ok(extended) => extended,
                Err(err) => {
                    warn!(error = %err, "session extension failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(Resolution {
            record,
            tenant,
            cache_hit,
            token_extended,
        })
    }

    async fn resolve_tenant(&self, record: &CredentialRecord) -> GatewayResult<TenantContext> {
        let key = CacheKey::tenant(record.tenant_id);
        if let Some(tenant) = self.cache.tenant_info().get(&key) {
            return Ok(tenant);
        }
        let Some(tenant) = self.store.fetch_tenant(record.tenant_id).await? else {
            // A credential row pointing at a missing tenant is a data
            // integrity problem, not a caller mistake.
            return Err(GatewayError::internal(format!(
                "tenant {} referenced by credential but not found",
                record.tenant_id
            )));
        };
        if tenant.active {
            self.cache.tenant_info().insert(key, tenant.clone());
        }
        Ok(tenant)
    }
}
