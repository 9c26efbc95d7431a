//! Error taxonomy for gateway operations

use thiserror::Error;

/// Why a credential failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CredentialFailure {
    #[error("no credential presented")]
    Missing,

    #[error("credential has expired")]
    Expired,

    #[error("credential has been revoked")]
    Revoked,

    #[error("credential is malformed")]
    Malformed,

    #[error("credential is not known to the store")]
    Unknown,

    #[error("tenant is inactive")]
    TenantInactive,
}

/// Gateway error taxonomy.
///
/// Security violations (`CrossTenantViolation`, `ResourceOwnership`,
/// `QuerySecurity`, `CredentialResolution`) always surface as a 403 with a
/// translated message; `CacheInconsistency` and `AuditWrite` are recovered
/// locally and never affect a request's outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("credential resolution failed: {reason}")]
    CredentialResolution { reason: CredentialFailure },

    #[error("cross-tenant access blocked for {resource_type} {resource_id}")]
    CrossTenantViolation {
        resource_type: String,
        resource_id: String,
    },

    #[error("resource ownership could not be established for {resource_type} {resource_id}")]
    ResourceOwnership {
        resource_type: String,
        resource_id: String,
    },

    #[error("query rejected by security pre-check: {pattern}")]
    QuerySecurity { pattern: String },

    #[error("validation path '{path}' exceeded {timeout_ms}ms")]
    ValidationTimeout { path: String, timeout_ms: u64 },

    #[error("cache inconsistency in namespace {namespace}: {reason}")]
    CacheInconsistency { namespace: String, reason: String },

    #[error("audit write failed: {reason}")]
    AuditWrite { reason: String },

    #[error("store operation failed: {reason}")]
    Store { reason: String },

    #[error("store connection pool exhausted")]
    PoolExhausted,

    #[error("missing required configuration field: {field}")]
    ConfigMissing { field: String },

    #[error("invalid value for {field}: {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl GatewayError {
    /// Stable violation-type label used in deny responses and audit records.
    pub fn violation_type(&self) -> &'static str {
        match self {
            GatewayError::CredentialResolution { .. } => "CREDENTIAL_RESOLUTION_FAILED",
            GatewayError::CrossTenantViolation { .. } => "CROSS_TENANT_BLOCKED",
            GatewayError::ResourceOwnership { .. } => "RESOURCE_VALIDATION_FAILED",
            GatewayError::QuerySecurity { .. } => "QUERY_SECURITY_VIOLATION",
            GatewayError::ValidationTimeout { .. } => "VALIDATION_TIMEOUT",
            GatewayError::CacheInconsistency { .. } => "CACHE_INCONSISTENCY",
            GatewayError::AuditWrite { .. } => "AUDIT_WRITE_FAILURE",
            GatewayError::Store { .. } | GatewayError::PoolExhausted => "STORE_UNAVAILABLE",
            GatewayError::ConfigMissing { .. } | GatewayError::ConfigInvalid { .. } => {
                "CONFIGURATION_ERROR"
            }
            GatewayError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether the error denies the request (as opposed to being recovered
    /// locally).
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            GatewayError::CredentialResolution { .. }
                | GatewayError::CrossTenantViolation { .. }
                | GatewayError::ResourceOwnership { .. }
                | GatewayError::QuerySecurity { .. }
        )
    }

    /// Non-fatal errors are logged and counted but never change a
    /// request's outcome.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GatewayError::CacheInconsistency { .. } | GatewayError::AuditWrite { .. }
        )
    }

    pub fn store(reason: impl Into<String>) -> Self {
        GatewayError::Store {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        GatewayError::Internal {
            reason: reason.into(),
        }
    }

    pub fn credential(reason: CredentialFailure) -> Self {
        GatewayError::CredentialResolution { reason }
    }
}

/// Result type alias used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;
