//! Resource ownership validation.
//!
//! Confirms that a referenced resource actually belongs to the caller's
//! tenant before the request is allowed through. Unregistered resource
//! types are denied outright, and only positive outcomes are cached so
//! a transfer or delete can never be masked by a stale deny.

use crate::store::OwnershipProbe;
use std::sync::Arc;
use tracing::{debug, warn};
use warden_cache::{CacheKey, ValidationCache};
use warden_core::{
    GatewayError, GatewayResult, ResourceReference, ResourceRegistry, TenantContext,
};
use warden_core::UserId;

pub struct OwnershipValidator {
    registry: Arc<ResourceRegistry>,
    cache: Arc<ValidationCache>,
    probe: Arc<dyn OwnershipProbe>,
}

impl OwnershipValidator {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        cache: Arc<ValidationCache>,
        probe: Arc<dyn OwnershipProbe>,
    ) -> Self {
        Self {
            registry,
            cache,
            probe,
        }
    }

    /// Validate that `resource` is owned by the caller's tenant.
    ///
    /// Returns `Ok(())` when ownership is confirmed. A resource that
    /// exists under another tenant yields `CrossTenantViolation`; one
    /// that does not exist at all yields `ResourceOwnership`, so the
    /// caller cannot use the gateway as an existence oracle distinct
    /// from its own data.
    pub async fn validate(
        &self,
        tenant: &TenantContext,
        user_id: Option<UserId>,
        resource: &ResourceReference,
    ) -> GatewayResult<()> {
        let Some(bindings) = self.registry.tables_for(&resource.resource_type) else {
            warn!(
                resource_type = %resource.resource_type,
                "unregistered resource type"
            );
            return Err(GatewayError::ResourceOwnership {
                resource_type: resource.resource_type.clone(),
                resource_id: resource.resource_id.clone(),
            });
        };

        let cache_key =
            user_id.map(|user| CacheKey::permission(tenant.tenant_id, user, resource));
        if let Some(key) = &cache_key {
            if self.cache.permission().get(key) == Some(true) {
                return Ok(());
            }
        }

        for binding in bindings {
            if self
                .probe
                .row_owned_by_tenant(binding, &resource.resource_id, tenant.tenant_id)
                .await?
            {
                if let Some(key) = cache_key {
                    self.cache.permission().insert(key, true);
                }
                return Ok(());
            }
        }

        // Ownership failed everywhere; distinguish a cross-tenant grab
        // from a reference to nothing.
        for binding in bindings {
            if self.probe.row_exists(binding, &resource.resource_id).await? {
                warn!(
                    tenant_id = %tenant.tenant_id,
                    resource_type = %resource.resource_type,
                    resource_id = %resource.resource_id,
                    "cross-tenant access blocked"
                );
                return Err(GatewayError::CrossTenantViolation {
                    resource_type: resource.resource_type.clone(),
                    resource_id: resource.resource_id.clone(),
                });
            }
        }

        debug!(
            resource_type = %resource.resource_type,
            resource_id = %resource.resource_id,
            "referenced resource does not exist"
        );
        Err(GatewayError::ResourceOwnership {
            resource_type: resource.resource_type.clone(),
            resource_id: resource.resource_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use warden_core::{CacheSettings, TableBinding, TenantId};

    /// Maps resource id -> owning tenant.
    struct FakeProbe {
        rows: HashMap<String, TenantId>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl OwnershipProbe for FakeProbe {
        async fn row_owned_by_tenant(
            &self,
            _binding: &TableBinding,
            resource_id: &str,
            tenant_id: TenantId,
        ) -> GatewayResult<bool> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.get(resource_id) == Some(&tenant_id))
        }

        async fn row_exists(
            &self,
            _binding: &TableBinding,
            resource_id: &str,
        ) -> GatewayResult<bool> {
            Ok(self.rows.contains_key(resource_id))
        }
    }

    fn tenant(tenant_id: TenantId) -> TenantContext {
        TenantContext {
            tenant_id,
            business_key: "acme".to_string(),
            active: true,
        }
    }

    fn validator(rows: HashMap<String, TenantId>) -> (OwnershipValidator, Arc<FakeProbe>) {
        let probe = Arc::new(FakeProbe {
            rows,
            probes: AtomicUsize::new(0),
        });
        let validator = OwnershipValidator::new(
            Arc::new(ResourceRegistry::with_defaults()),
            Arc::new(ValidationCache::new(&CacheSettings::default())),
            probe.clone(),
        );
        (validator, probe)
    }

    #[tokio::test]
    async fn test_owned_resource_allowed() {
        let tenant_id = TenantId::now_v7();
        let (validator, _) = validator(HashMap::from([("a1".to_string(), tenant_id)]));
        validator
            .validate(&tenant(tenant_id), None, &ResourceReference::new("asset", "a1"))
            .await
            .expect("allow");
    }

    #[tokio::test]
    async fn test_foreign_resource_is_cross_tenant() {
        let owner = TenantId::now_v7();
        let caller = TenantId::now_v7();
        let (validator, _) = validator(HashMap::from([("a1".to_string(), owner)]));
        let err = validator
            .validate(&tenant(caller), None, &ResourceReference::new("asset", "a1"))
            .await
            .expect_err("deny");
        assert!(matches!(err, GatewayError::CrossTenantViolation { .. }));
    }

    #[tokio::test]
    async fn test_missing_resource_is_ownership_failure() {
        let tenant_id = TenantId::now_v7();
        let (validator, _) = validator(HashMap::new());
        let err = validator
            .validate(
                &tenant(tenant_id),
                None,
                &ResourceReference::new("asset", "ghost"),
            )
            .await
            .expect_err("deny");
        assert!(matches!(err, GatewayError::ResourceOwnership { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_type_denied_without_probe() {
        let tenant_id = TenantId::now_v7();
        let (validator, probe) = validator(HashMap::new());
        let err = validator
            .validate(
                &tenant(tenant_id),
                None,
                &ResourceReference::new("launch_code", "x"),
            )
            .await
            .expect_err("deny");
        assert!(matches!(err, GatewayError::ResourceOwnership { .. }));
        assert_eq!(probe.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_positive_outcome_cached_per_user() {
        let tenant_id = TenantId::now_v7();
        let user = UserId::now_v7();
        let (validator, probe) = validator(HashMap::from([("a1".to_string(), tenant_id)]));
        let resource = ResourceReference::new("asset", "a1");

        validator
            .validate(&tenant(tenant_id), Some(user), &resource)
            .await
            .expect("allow");
        let after_first = probe.probes.load(Ordering::SeqCst);

        validator
            .validate(&tenant(tenant_id), Some(user), &resource)
            .await
            .expect("allow");
        assert_eq!(probe.probes.load(Ordering::SeqCst), after_first);
    }
}
