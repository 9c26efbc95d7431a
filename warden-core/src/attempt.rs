//! Validation attempt audit records
//!
//! Exactly one `ValidationAttempt` is produced per request, including on
//! internal errors. Records are append-only: constructed once, queued to the
//! audit recorder, never mutated afterwards. The credential appears only as
//! its fingerprint.

use crate::identity::{RequestId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one validation path (legacy or enhanced).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOutcome {
    pub success: bool,
    pub duration_ms: i64,
    /// Violation-type label on failure, absent on success.
    pub failure: Option<String>,
}

impl PathOutcome {
    pub fn success(duration_ms: i64) -> Self {
        Self {
            success: true,
            duration_ms,
            failure: None,
        }
    }

    pub fn failure(duration_ms: i64, label: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_ms,
            failure: Some(label.into()),
        }
    }
}

/// Audit record for one gateway request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    pub request_id: RequestId,
    /// SHA-256 hex fingerprint of the presented credential; never the raw
    /// value. Empty string when no credential was presented.
    pub credential_fingerprint: String,
    /// Resolved tenant, absent when resolution failed.
    pub tenant_id: Option<TenantId>,
    pub endpoint: String,
    pub legacy: PathOutcome,
    pub enhanced: PathOutcome,
    /// Structured payload from the enhanced path (observational).
    pub enhanced_payload: serde_json::Value,
    pub results_match: bool,
    pub performance_improvement_ms: i64,
    pub cross_tenant_blocked: bool,
    pub cache_hit: bool,
    /// Whether this request slid a session token's expiry forward.
    pub token_extended: bool,
    pub timestamp: DateTime<Utc>,
}

impl ValidationAttempt {
    /// Record for a request that never reached the validation paths
    /// (missing/invalid credential, malformed request). Both paths are
    /// marked failed so the "one attempt per request" invariant holds.
    pub fn unresolved(
        request_id: RequestId,
        credential_fingerprint: String,
        endpoint: impl Into<String>,
        failure_label: &str,
    ) -> Self {
        Self {
            request_id,
            credential_fingerprint,
            tenant_id: None,
            endpoint: endpoint.into(),
            legacy: PathOutcome::failure(0, failure_label),
            enhanced: PathOutcome::failure(0, failure_label),
            enhanced_payload: serde_json::Value::Null,
            results_match: true,
            performance_improvement_ms: 0,
            cross_tenant_blocked: false,
            cache_hit: false,
            token_extended: false,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_marks_both_paths_failed() {
        let attempt = ValidationAttempt::unresolved(
            RequestId::now_v7(),
            String::new(),
            "/api/v1/assets",
            "CREDENTIAL_RESOLUTION_FAILED",
        );

        assert!(!attempt.legacy.success);
        assert!(!attempt.enhanced.success);
        assert!(attempt.tenant_id.is_none());
        assert_eq!(
            attempt.legacy.failure.as_deref(),
            Some("CREDENTIAL_RESOLUTION_FAILED")
        );
    }

    #[test]
    fn test_attempt_serializes_with_snake_case_fields() {
        let attempt = ValidationAttempt::unresolved(
            RequestId::now_v7(),
            "ab12".into(),
            "/x",
            "INTERNAL_ERROR",
        );
        let json = serde_json::to_value(&attempt).expect("serializable");
        assert!(json.get("credential_fingerprint").is_some());
        assert!(json.get("results_match").is_some());
        assert!(json.get("cache_hit").is_some());
        assert!(json.get("token_extended").is_some());
    }
}
