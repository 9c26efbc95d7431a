//! HTTP error surface for the gateway.
//!
//! Internal failures are collapsed into a small set of response shapes:
//! security violations become a structured 403 deny body, store and
//! infrastructure trouble becomes a generic 5xx with no internal detail.
//! The full error is always logged before it is collapsed.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use warden_core::{GatewayError, RequestId};

// ============================================================================
// ERROR CODES
// ============================================================================

/// Response categories the gateway emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Security violation; always a 403 with the deny body.
    AccessDenied,
    /// The request itself was unusable (unparseable header, bad id).
    InvalidRequest,
    /// Store unavailable or pool exhausted.
    ServiceUnavailable,
    /// A validation path exceeded its deadline and no decision was made.
    Timeout,
    /// Anything else.
    Internal,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::AccessDenied => StatusCode::FORBIDDEN,
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// API ERROR
// ============================================================================

/// An error ready to leave the gateway as an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Caller-facing message; already translated, never technical.
    pub message: String,
    /// Suggested next step for the caller, when one exists.
    pub helpful_action: Option<String>,
    /// Violation label for deny responses (`CROSS_TENANT_BLOCKED`, ...).
    pub violation_type: Option<String>,
    pub request_id: Option<RequestId>,
}

/// Serialized deny body.
///
/// The `error` field is the constant `"Access Denied"` for every 403 so
/// callers cannot distinguish violation flavors by shape alone; the
/// detail lives in `violation_type`.
#[derive(Debug, Serialize)]
struct DenyBody<'a> {
    error: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    helpful_action: Option<&'a str>,
    violation_type: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlainBody<'a> {
    error: &'a str,
    message: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            helpful_action: None,
            violation_type: None,
            request_id: None,
        }
    }

    /// A structured 403 deny.
    pub fn deny(message: impl Into<String>, violation_type: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::AccessDenied,
            message: message.into(),
            helpful_action: None,
            violation_type: Some(violation_type.into()),
            request_id: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn service_unavailable() -> Self {
        Self::new(ErrorCode::ServiceUnavailable, "Service temporarily unavailable")
    }

    /// Generic 500. The detail is logged, never surfaced to the caller.
    pub fn internal(detail: impl Into<String>) -> Self {
        tracing::error!(detail = %detail.into(), "internal gateway error");
        Self::new(ErrorCode::Internal, "Internal server error")
    }

    pub fn timeout() -> Self {
        Self::new(ErrorCode::Timeout, "Validation timed out")
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.helpful_action = Some(action.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let timestamp = Utc::now().to_rfc3339();
        let request_id = self.request_id.map(|id| id.to_string());

        if let Some(violation_type) = &self.violation_type {
            let body = DenyBody {
                error: "Access Denied",
                message: &self.message,
                helpful_action: self.helpful_action.as_deref(),
                violation_type,
                timestamp,
                request_id,
            };
            (status, Json(body)).into_response()
        } else {
            let error = match self.code {
                ErrorCode::InvalidRequest => "Invalid Request",
                ErrorCode::ServiceUnavailable => "Service Unavailable",
                ErrorCode::Timeout => "Timeout",
                _ => "Internal Error",
            };
            let body = PlainBody {
                error,
                message: &self.message,
                timestamp,
                request_id,
            };
            (status, Json(body)).into_response()
        }
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Fallback conversion used outside the translated middleware path.
/// Security violations keep their label; everything else collapses to
/// the generic shape for its category.
impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        if err.is_security_violation() {
            return ApiError::deny("Access to this resource is not permitted", err.violation_type());
        }
        match err {
            GatewayError::ValidationTimeout { .. } => ApiError::timeout(),
            GatewayError::Store { .. } | GatewayError::PoolExhausted => {
                tracing::error!(error = %err, "store failure surfaced to caller");
                ApiError::service_unavailable()
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = ?err, "database error");
        ApiError::service_unavailable()
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!(error = ?err, "connection pool error");
        ApiError::service_unavailable()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCode::AccessDenied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::InvalidRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::ServiceUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_security_violations_become_denies() {
        let err: ApiError = GatewayError::CrossTenantViolation {
            resource_type: "asset".into(),
            resource_id: "a-1".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::AccessDenied);
        assert_eq!(err.violation_type.as_deref(), Some("CROSS_TENANT_BLOCKED"));
        // The table/row detail never reaches the body.
        assert!(!err.message.contains("a-1"));
    }

    #[test]
    fn test_store_errors_collapse_to_generic_503() {
        let err: ApiError = GatewayError::PoolExhausted.into();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
        assert_eq!(err.message, "Service temporarily unavailable");
    }

    #[test]
    fn test_timeout_maps_to_504() {
        let err: ApiError = GatewayError::ValidationTimeout {
            path: "enhanced".into(),
            timeout_ms: 500,
        }
        .into();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[test]
    fn test_deny_builder() {
        let id = RequestId::now_v7();
        let err = ApiError::deny("No access", "QUERY_SECURITY_VIOLATION")
            .with_action("Check the resource identifier")
            .with_request_id(id);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.request_id, Some(id));
        assert_eq!(err.helpful_action.as_deref(), Some("Check the resource identifier"));
    }
}
