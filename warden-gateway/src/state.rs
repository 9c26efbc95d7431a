//! Shared gateway state.

use crate::audit::AuditRecorder;
use crate::ownership::OwnershipValidator;
use crate::resolver::CredentialResolver;
use crate::shadow::{EnhancedPath, LegacyPath, ShadowEngine};
use crate::store::{CredentialStore, OwnershipProbe};
use crate::translate::ErrorTranslator;
use std::sync::Arc;
use std::time::Instant;
use warden_cache::ValidationCache;
use warden_core::{GatewayConfig, ResourceRegistry};

/// Attempts buffered before the audit queue starts dropping.
const AUDIT_QUEUE_CAPACITY: usize = 10_000;

/// Everything a request handler needs, cheap to clone.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<ValidationCache>,
    pub registry: Arc<ResourceRegistry>,
    pub engine: Arc<ShadowEngine>,
    pub audit: Arc<AuditRecorder>,
    pub translator: Arc<ErrorTranslator>,
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
        probe: Arc<dyn OwnershipProbe>,
    ) -> Self {
        let cache = Arc::new(ValidationCache::new(&config.cache));
        let registry = Arc::new(ResourceRegistry::with_defaults());

        let resolver = Arc::new(CredentialResolver::new(store.clone(), cache.clone()));
        let ownership = Arc::new(OwnershipValidator::new(
            registry.clone(),
            cache.clone(),
            probe.clone(),
        ));

        let legacy = Arc::new(LegacyPath::new(store, probe, registry.clone()));
        let enhanced = Arc::new(EnhancedPath::new(resolver, ownership));
        let engine = Arc::new(ShadowEngine::new(
            config.shadow,
            legacy,
            enhanced,
            config.performance.improvement_target_pct,
        ));

        let translator = Arc::new(ErrorTranslator::new(config.errors));

        Self {
            config: Arc::new(config),
            cache,
            registry,
            engine,
            audit: Arc::new(AuditRecorder::new(AUDIT_QUEUE_CAPACITY)),
            translator,
            start_time: Instant::now(),
        }
    }
}
