//! WARDEN Cache - Validation Cache Layer
//!
//! TTL + LRU caching for the three hot lookup paths on the request
//! critical path: credential resolution, tenant context, and ownership
//! decisions. Each namespace has its own TTL, capacity, and counters,
//! and a background task tunes the TTLs toward a hit-rate target.
//!
//! # Isolation
//!
//! Keys are constructed through [`CacheKey`]'s namespace-specific
//! constructors only, and tenant-scoped namespaces bake the tenant id
//! into the digest. A lookup for one tenant structurally cannot return
//! another tenant's entry.

pub mod key;
pub mod lru;
pub mod tuner;

pub use key::{CacheKey, Namespace};
pub use lru::{CacheStats, CacheStatsSnapshot, TtlLruCache};
pub use tuner::{ttl_tuner_task, TunedCache, TunerPolicy};

use std::sync::Arc;
use warden_core::{CacheSettings, CredentialRecord, TenantContext};

/// Aggregated statistics across namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationCacheStats {
    pub validation: CacheStatsSnapshot,
    pub tenant_info: CacheStatsSnapshot,
    pub permission: CacheStatsSnapshot,
}

impl ValidationCacheStats {
    /// Hit rate across all three namespaces combined.
    pub fn combined_hit_rate_pct(&self) -> f64 {
        let hits = self.validation.hits + self.tenant_info.hits + self.permission.hits;
        let misses = self.validation.misses + self.tenant_info.misses + self.permission.misses;
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64 * 100.0
    }
}

/// The three-namespace validation cache.
///
/// Namespaces are held behind `Arc` so the TTL tuner can manage them
/// without taking ownership.
pub struct ValidationCache {
    validation: Arc<TtlLruCache<CredentialRecord>>,
    tenant_info: Arc<TtlLruCache<TenantContext>>,
    permission: Arc<TtlLruCache<bool>>,
}

impl ValidationCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            validation: Arc::new(TtlLruCache::from_settings(
                Namespace::Validation.as_str(),
                &settings.validation,
            )),
            tenant_info: Arc::new(TtlLruCache::from_settings(
                Namespace::TenantInfo.as_str(),
                &settings.tenant_info,
            )),
            permission: Arc::new(TtlLruCache::from_settings(
                Namespace::Permission.as_str(),
                &settings.permission,
            )),
        }
    }

    pub fn validation(&self) -> &TtlLruCache<CredentialRecord> {
        &self.validation
    }

    pub fn tenant_info(&self) -> &TtlLruCache<TenantContext> {
        &self.tenant_info
    }

    pub fn permission(&self) -> &TtlLruCache<bool> {
        &self.permission
    }

    /// Handles for the TTL tuner task.
    pub fn tuned_caches(&self) -> Vec<Arc<dyn TunedCache>> {
        vec![
            self.validation.clone(),
            self.tenant_info.clone(),
            self.permission.clone(),
        ]
    }

    /// Purge every namespace of everything belonging to a tenant.
    ///
    /// Called when a tenant is deactivated or its credentials revoked,
    /// so stale allow decisions cannot outlive the revocation.
    pub fn invalidate_tenant(&self, tenant_id: warden_core::TenantId) -> usize {
        self.validation.invalidate_tenant(tenant_id)
            + self.tenant_info.invalidate_tenant(tenant_id)
            + self.permission.invalidate_tenant(tenant_id)
    }

    pub fn stats(&self) -> ValidationCacheStats {
        ValidationCacheStats {
            validation: self.validation.stats(),
            tenant_info: self.tenant_info.stats(),
            permission: self.permission.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use warden_core::{ResourceReference, TenantId, UserId};

    fn cache() -> ValidationCache {
        ValidationCache::new(&CacheSettings::default())
    }

    #[test]
    fn test_namespaces_are_independent() {
        let cache = cache();
        let tenant = TenantId::new(Uuid::now_v7());

        cache.tenant_info().insert(
            CacheKey::tenant(tenant),
            TenantContext {
                tenant_id: tenant,
                business_key: "acme".to_string(),
                active: true,
            },
        );

        assert_eq!(cache.stats().tenant_info.inserts, 1);
        assert_eq!(cache.stats().validation.inserts, 0);
        assert_eq!(cache.stats().permission.inserts, 0);
    }

    #[test]
    fn test_tenant_invalidation_spans_namespaces() {
        let cache = cache();
        let tenant = TenantId::new(Uuid::now_v7());
        let user = UserId::new(Uuid::now_v7());
        let resource = ResourceReference {
            resource_type: "asset".to_string(),
            resource_id: "7".to_string(),
        };

        cache.tenant_info().insert(
            CacheKey::tenant(tenant),
            TenantContext {
                tenant_id: tenant,
                business_key: "acme".to_string(),
                active: true,
            },
        );
        cache
            .permission()
            .insert(CacheKey::permission(tenant, user, &resource), true);

        assert_eq!(cache.invalidate_tenant(tenant), 2);
        assert_eq!(cache.tenant_info().get(&CacheKey::tenant(tenant)), None);
        assert_eq!(
            cache
                .permission()
                .get(&CacheKey::permission(tenant, user, &resource)),
            None
        );
    }

    #[test]
    fn test_combined_hit_rate() {
        let cache = cache();
        let tenant = TenantId::new(Uuid::now_v7());

        cache.tenant_info().insert(
            CacheKey::tenant(tenant),
            TenantContext {
                tenant_id: tenant,
                business_key: "acme".to_string(),
                active: true,
            },
        );
        assert!(cache.tenant_info().get(&CacheKey::tenant(tenant)).is_some());
        assert!(cache.validation().get(&CacheKey::credential("ff")).is_none());

        let stats = cache.stats();
        assert!((stats.combined_hit_rate_pct() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tuned_caches_exposes_all_namespaces() {
        let cache = cache();
        let handles = cache.tuned_caches();
        assert_eq!(handles.len(), 3);
        let names: Vec<&str> = handles.iter().map(|h| h.name()).collect();
        assert!(names.contains(&"validation"));
        assert!(names.contains(&"tenant_info"));
        assert!(names.contains(&"permission"));
    }
}
