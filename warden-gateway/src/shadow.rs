//! Shadow dual-path validation.
//!
//! Every request is validated twice: once by the legacy store-direct
//! path and once by the enhanced cache-first path. Both verdicts are
//! timed and reconciled, and one of them is authoritative depending on
//! `fail_safe_mode`. The promotion tracker accumulates agreement and
//! latency evidence until the enhanced path has earned authority.

use crate::ownership::OwnershipValidator;
use crate::resolver::CredentialResolver;
use crate::store::{CredentialStore, OwnershipProbe};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use warden_core::{
    Credential, CredentialFailure, CredentialRecord, GatewayError, GatewayResult, PathOutcome,
    ResourceReference, ResourceRegistry, ShadowConfig, TenantContext, TenantId,
};

/// What a path is asked to validate. Every extracted resource must be
/// confirmed; one foreign reference denies the whole request.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub credential: Credential,
    pub resources: Vec<ResourceReference>,
}

/// A path's allow verdict. A deny is the `Err` side of the result.
#[derive(Debug, Clone, PartialEq)]
pub struct PathDecision {
    pub tenant: TenantContext,
    pub record: CredentialRecord,
    pub cache_hit: bool,
    pub token_extended: bool,
}

#[async_trait]
pub trait ValidationPath: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(&self, request: &ValidationRequest) -> GatewayResult<PathDecision>;
}

/// Store-direct validation, one round trip per check, no caching.
pub struct LegacyPath {
    store: Arc<dyn CredentialStore>,
    probe: Arc<dyn OwnershipProbe>,
    registry: Arc<ResourceRegistry>,
}

impl LegacyPath {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        probe: Arc<dyn OwnershipProbe>,
        registry: Arc<ResourceRegistry>,
    ) -> Self {
        Self {
            store,
            probe,
            registry,
        }
    }

    async fn confirm_owned(
        &self,
        resource: &ResourceReference,
        tenant_id: TenantId,
    ) -> GatewayResult<()> {
        let Some(bindings) = self.registry.tables_for(&resource.resource_type) else {
            return Err(GatewayError::ResourceOwnership {
                resource_type: resource.resource_type.clone(),
                resource_id: resource.resource_id.clone(),
            });
        };
        for binding in bindings {
            if self
                .probe
                .row_owned_by_tenant(binding, &resource.resource_id, tenant_id)
                .await?
            {
                return Ok(());
            }
        }
        let mut exists = false;
        for binding in bindings {
            if self.probe.row_exists(binding, &resource.resource_id).await? {
                exists = true;
                break;
            }
        }
        Err(if exists {
            GatewayError::CrossTenantViolation {
                resource_type: resource.resource_type.clone(),
                resource_id: resource.resource_id.clone(),
            }
        } else {
            GatewayError::ResourceOwnership {
                resource_type: resource.resource_type.clone(),
                resource_id: resource.resource_id.clone(),
            }
        })
    }
}

#[async_trait]
impl ValidationPath for LegacyPath {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn validate(&self, request: &ValidationRequest) -> GatewayResult<PathDecision> {
        if !request.credential.is_well_formed() {
            return Err(GatewayError::credential(CredentialFailure::Malformed));
        }
        let Some(record) = self.store.fetch_credential(&request.credential).await? else {
            return Err(GatewayError::credential(CredentialFailure::Unknown));
        };
        if record.revoked {
            return Err(GatewayError::credential(CredentialFailure::Revoked));
        }
        if record.is_expired(Utc::now()) {
            return Err(GatewayError::credential(CredentialFailure::Expired));
        }
        let Some(tenant) = self.store.fetch_tenant(record.tenant_id).await? else {
            return Err(GatewayError::internal(format!(
                "tenant {} referenced by credential but not found",
                record.tenant_id
            )));
        };
        if !tenant.active {
            return Err(GatewayError::credential(CredentialFailure::TenantInactive));
        }

        for resource in &request.resources {
            self.confirm_owned(resource, tenant.tenant_id).await?;
        }

        Ok(PathDecision {
            tenant,
            record,
            cache_hit: false,
            token_extended: false,
        })
    }
}

/// Cache-first validation built on the resolver and ownership layers.
pub struct EnhancedPath {
    resolver: Arc<CredentialResolver>,
    ownership: Arc<OwnershipValidator>,
}

impl EnhancedPath {
    pub fn new(resolver: Arc<CredentialResolver>, ownership: Arc<OwnershipValidator>) -> Self {
        Self {
            resolver,
            ownership,
        }
    }
}

#[async_trait]
impl ValidationPath for EnhancedPath {
    fn name(&self) -> &'static str {
        "enhanced"
    }

    async fn validate(&self, request: &ValidationRequest) -> GatewayResult<PathDecision> {
        let resolution = self.resolver.resolve(&request.credential).await?;
        for resource in &request.resources {
            self.ownership
                .validate(&resolution.tenant, resolution.record.user_id, resource)
                .await?;
        }
        Ok(PathDecision {
            tenant: resolution.tenant,
            record: resolution.record,
            cache_hit: resolution.cache_hit,
            token_extended: resolution.token_extended,
        })
    }
}

/// Reconciled outcome of one shadow run.
#[derive(Debug, Clone)]
pub struct ShadowOutcome {
    pub decision: GatewayResult<PathDecision>,
    pub legacy: PathOutcome,
    pub enhanced: PathOutcome,
    pub results_match: bool,
    pub performance_improvement_ms: i64,
    pub enhanced_payload: serde_json::Value,
    pub cache_hit: bool,
    pub token_extended: bool,
}

pub struct ShadowEngine {
    config: ShadowConfig,
    legacy: Arc<dyn ValidationPath>,
    enhanced: Arc<dyn ValidationPath>,
    tracker: PromotionTracker,
}

impl ShadowEngine {
    pub fn new(
        config: ShadowConfig,
        legacy: Arc<dyn ValidationPath>,
        enhanced: Arc<dyn ValidationPath>,
        improvement_target_pct: f64,
    ) -> Self {
        Self {
            config,
            legacy,
            enhanced,
            tracker: PromotionTracker::new(improvement_target_pct),
        }
    }

    pub fn tracker(&self) -> &PromotionTracker {
        &self.tracker
    }

    /// Run both paths and reconcile their verdicts.
    ///
    /// Each path runs in its own task so a panic inside one is contained
    /// as that path's failure instead of unwinding through the request.
    pub async fn run(&self, request: &ValidationRequest) -> ShadowOutcome {
        let timeout_ms = self.config.timeout_ms;
        let (legacy_result, legacy_ms, enhanced_result, enhanced_ms) =
            if self.config.parallel_enabled {
                let legacy =
                    tokio::spawn(drive_path(self.legacy.clone(), request.clone(), timeout_ms));
                let enhanced =
                    tokio::spawn(drive_path(self.enhanced.clone(), request.clone(), timeout_ms));
                let (l, e) = tokio::join!(legacy, enhanced);
                let (lr, lms) = recover_path(self.legacy.name(), l);
                let (er, ems) = recover_path(self.enhanced.name(), e);
                (lr, lms, er, ems)
            } else {
                let legacy =
                    tokio::spawn(drive_path(self.legacy.clone(), request.clone(), timeout_ms));
                let (lr, lms) = recover_path(self.legacy.name(), legacy.await);
                let enhanced =
                    tokio::spawn(drive_path(self.enhanced.clone(), request.clone(), timeout_ms));
                let (er, ems) = recover_path(self.enhanced.name(), enhanced.await);
                (lr, lms, er, ems)
            };

        let legacy_outcome = path_outcome(&legacy_result, legacy_ms);
        let enhanced_outcome = path_outcome(&enhanced_result, enhanced_ms);
        let results_match = verdicts_agree(&legacy_result, &enhanced_result);
        let improvement_ms = legacy_ms - enhanced_ms;
        let cache_hit = matches!(&enhanced_result, Ok(d) if d.cache_hit);
        let token_extended = matches!(&enhanced_result, Ok(d) if d.token_extended);

        if !results_match {
            warn!(
                legacy = %outcome_label(&legacy_result),
                enhanced = %outcome_label(&enhanced_result),
                "validation paths disagree"
            );
        }
        self.tracker.observe(results_match, improvement_ms);

        let enhanced_payload = json!({
            "path": "enhanced",
            "outcome": outcome_label(&enhanced_result),
            "duration_ms": enhanced_ms,
            "cache_hit": cache_hit,
            "token_extended": token_extended,
        });

        // Fail-safe mode keeps the legacy verdict authoritative until
        // the enhanced path has been promoted. Outside it the enhanced
        // verdict wins when it succeeded; an enhanced-path failure falls
        // back to whatever the legacy path concluded.
        let decision = if self.config.fail_safe_mode {
            legacy_result
        } else if enhanced_result.is_ok() {
            enhanced_result
        } else {
            legacy_result
        };

        ShadowOutcome {
            decision,
            legacy: legacy_outcome,
            enhanced: enhanced_outcome,
            results_match,
            performance_improvement_ms: improvement_ms,
            enhanced_payload,
            cache_hit,
            token_extended,
        }
    }
}

async fn drive_path(
    path: Arc<dyn ValidationPath>,
    request: ValidationRequest,
    timeout_ms: u64,
) -> (GatewayResult<PathDecision>, i64) {
    let budget = Duration::from_millis(timeout_ms);
    let started = Instant::now();
    let result = match tokio::time::timeout(budget, path.validate(&request)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::ValidationTimeout {
            path: path.name().to_string(),
            timeout_ms,
        }),
    };
    (result, started.elapsed().as_millis() as i64)
}

fn recover_path(
    name: &'static str,
    joined: Result<(GatewayResult<PathDecision>, i64), tokio::task::JoinError>,
) -> (GatewayResult<PathDecision>, i64) {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(path = name, error = %err, "validation path task aborted");
            (
                Err(GatewayError::internal(format!(
                    "{name} validation path aborted before producing a verdict"
                ))),
                0,
            )
        }
    }
}

fn path_outcome(result: &GatewayResult<PathDecision>, duration_ms: i64) -> PathOutcome {
    match result {
        Ok(_) => PathOutcome::success(duration_ms),
        Err(err) => PathOutcome::failure(duration_ms, err.violation_type()),
    }
}

fn outcome_label(result: &GatewayResult<PathDecision>) -> String {
    match result {
        Ok(_) => "ALLOWED".to_string(),
        Err(err) => err.violation_type().to_string(),
    }
}

/// Two verdicts agree when they allow the same tenant or deny for the
/// same class of violation.
fn verdicts_agree(
    legacy: &GatewayResult<PathDecision>,
    enhanced: &GatewayResult<PathDecision>,
) -> bool {
    match (legacy, enhanced) {
        (Ok(l), Ok(e)) => l.tenant.tenant_id == e.tenant.tenant_id,
        (Err(l), Err(e)) => l.violation_type() == e.violation_type(),
        _ => false,
    }
}

/// Rolling evidence that the enhanced path is ready to take authority.
pub struct PromotionTracker {
    improvement_target_pct: f64,
    total: AtomicU64,
    matched: AtomicU64,
    improved: AtomicU64,
    announced: AtomicBool,
}

/// Runs observed before promotion readiness is evaluated.
const PROMOTION_SAMPLE: u64 = 100;

impl PromotionTracker {
    pub fn new(improvement_target_pct: f64) -> Self {
        Self {
            improvement_target_pct,
            total: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            improved: AtomicU64::new(0),
            announced: AtomicBool::new(false),
        }
    }

    fn observe(&self, results_match: bool, improvement_ms: i64) {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if results_match {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
        if improvement_ms > 0 {
            self.improved.fetch_add(1, Ordering::Relaxed);
        }
        if total < PROMOTION_SAMPLE || self.announced.load(Ordering::Relaxed) {
            return;
        }
        let match_pct = self.match_rate_pct();
        let improved_pct = self.improvement_rate_pct();
        if match_pct >= self.improvement_target_pct && improved_pct >= self.improvement_target_pct
        {
            if !self.announced.swap(true, Ordering::Relaxed) {
                info!(
                    runs = total,
                    match_pct,
                    improved_pct,
                    "enhanced validation path ready for promotion"
                );
            }
        }
    }

    pub fn match_rate_pct(&self) -> f64 {
        rate_pct(
            self.matched.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn improvement_rate_pct(&self) -> f64 {
        rate_pct(
            self.improved.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    pub fn runs(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

fn rate_pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{TenantId, UserId};

    struct FixedPath {
        name: &'static str,
        result: GatewayResult<PathDecision>,
        delay: Duration,
    }

    #[async_trait]
    impl ValidationPath for FixedPath {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn validate(&self, _request: &ValidationRequest) -> GatewayResult<PathDecision> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn decision(tenant_id: TenantId) -> PathDecision {
        PathDecision {
            tenant: TenantContext {
                tenant_id,
                business_key: "acme".to_string(),
                active: true,
            },
            record: CredentialRecord {
                tenant_id,
                user_id: Some(UserId::now_v7()),
                expires_at: None,
                revoked: false,
                scopes: vec![],
            },
            cache_hit: false,
            token_extended: false,
        }
    }

    fn request() -> ValidationRequest {
        ValidationRequest {
            credential: Credential::api_key("wdn_key_1"),
            resources: Vec::new(),
        }
    }

    fn engine(
        config: ShadowConfig,
        legacy: FixedPath,
        enhanced: FixedPath,
    ) -> ShadowEngine {
        ShadowEngine::new(config, Arc::new(legacy), Arc::new(enhanced), 95.0)
    }

    #[tokio::test]
    async fn test_matching_allows_reconcile() {
        let tenant_id = TenantId::now_v7();
        let engine = engine(
            ShadowConfig::default(),
            FixedPath {
                name: "legacy",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
            FixedPath {
                name: "enhanced",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
        );
        let outcome = engine.run(&request()).await;
        assert!(outcome.results_match);
        assert!(outcome.decision.is_ok());
        assert!(outcome.legacy.success);
        assert!(outcome.enhanced.success);
    }

    #[tokio::test]
    async fn test_fail_safe_prefers_legacy_verdict() {
        let tenant_id = TenantId::now_v7();
        let engine = engine(
            ShadowConfig {
                fail_safe_mode: true,
                ..ShadowConfig::default()
            },
            FixedPath {
                name: "legacy",
                result: Err(GatewayError::credential(CredentialFailure::Revoked)),
                delay: Duration::ZERO,
            },
            FixedPath {
                name: "enhanced",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
        );
        let outcome = engine.run(&request()).await;
        assert!(!outcome.results_match);
        assert_eq!(
            outcome.decision,
            Err(GatewayError::credential(CredentialFailure::Revoked))
        );
    }

    #[tokio::test]
    async fn test_without_fail_safe_enhanced_is_authoritative() {
        let tenant_id = TenantId::now_v7();
        let engine = engine(
            ShadowConfig {
                fail_safe_mode: false,
                ..ShadowConfig::default()
            },
            FixedPath {
                name: "legacy",
                result: Err(GatewayError::credential(CredentialFailure::Unknown)),
                delay: Duration::ZERO,
            },
            FixedPath {
                name: "enhanced",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
        );
        let outcome = engine.run(&request()).await;
        assert!(outcome.decision.is_ok());
    }

    #[tokio::test]
    async fn test_enhanced_failure_falls_back_to_legacy() {
        let tenant_id = TenantId::now_v7();
        let engine = engine(
            ShadowConfig {
                fail_safe_mode: false,
                ..ShadowConfig::default()
            },
            FixedPath {
                name: "legacy",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
            FixedPath {
                name: "enhanced",
                result: Err(GatewayError::Store {
                    reason: "connection refused".to_string(),
                }),
                delay: Duration::ZERO,
            },
        );

        // A transient enhanced-path failure must not deny a request the
        // legacy path allowed.
        let outcome = engine.run(&request()).await;
        assert!(!outcome.results_match);
        assert!(outcome.decision.is_ok());
        assert!(!outcome.enhanced.success);
    }

    struct PanickingPath;

    #[async_trait]
    impl ValidationPath for PanickingPath {
        fn name(&self) -> &'static str {
            "enhanced"
        }

        async fn validate(&self, _request: &ValidationRequest) -> GatewayResult<PathDecision> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_path_panic_becomes_failed_outcome() {
        let tenant_id = TenantId::now_v7();
        let engine = ShadowEngine::new(
            ShadowConfig {
                fail_safe_mode: false,
                ..ShadowConfig::default()
            },
            Arc::new(FixedPath {
                name: "legacy",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            }),
            Arc::new(PanickingPath),
            95.0,
        );

        let outcome = engine.run(&request()).await;
        assert!(!outcome.enhanced.success);
        assert!(outcome.legacy.success);
        assert!(outcome.decision.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_path_times_out() {
        let tenant_id = TenantId::now_v7();
        let engine = engine(
            ShadowConfig {
                timeout_ms: 100,
                ..ShadowConfig::default()
            },
            FixedPath {
                name: "legacy",
                result: Ok(decision(tenant_id)),
                delay: Duration::from_secs(5),
            },
            FixedPath {
                name: "enhanced",
                result: Ok(decision(tenant_id)),
                delay: Duration::ZERO,
            },
        );
        let outcome = engine.run(&request()).await;
        assert!(!outcome.legacy.success);
        assert_eq!(outcome.legacy.failure.as_deref(), Some("VALIDATION_TIMEOUT"));
        assert!(outcome.enhanced.success);
    }

    #[tokio::test]
    async fn test_matching_denials_agree() {
        let engine = engine(
            ShadowConfig::default(),
            FixedPath {
                name: "legacy",
                result: Err(GatewayError::credential(CredentialFailure::Expired)),
                delay: Duration::ZERO,
            },
            FixedPath {
                name: "enhanced",
                result: Err(GatewayError::credential(CredentialFailure::Expired)),
                delay: Duration::ZERO,
            },
        );
        let outcome = engine.run(&request()).await;
        assert!(outcome.results_match);
        assert!(outcome.decision.is_err());
    }

    #[test]
    fn test_promotion_tracker_announces_after_sample() {
        let tracker = PromotionTracker::new(95.0);
        for _ in 0..PROMOTION_SAMPLE {
            tracker.observe(true, 10);
        }
        assert!(tracker.announced.load(Ordering::Relaxed));
        assert!(tracker.match_rate_pct() > 99.0);
    }
}
