//! Error translation.
//!
//! Converts the internal error taxonomy into caller-facing language: a
//! short message, a suggested next step, and a severity used for log
//! levels. With `hide_technical_details` on (the default), no table,
//! column, query, or credential detail ever reaches the message.

use crate::error::ApiError;
use warden_core::{CredentialFailure, ErrorTranslationConfig, GatewayError, RequestId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Expected denials: bad or expired credentials, unknown resources.
    Warning,
    /// Active isolation boundary hits: cross-tenant access, query attacks.
    Critical,
    /// Infrastructure trouble unrelated to the caller.
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Error => "error",
        }
    }
}

/// A translated error, ready to be wrapped into a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Translated {
    pub message: String,
    pub helpful_action: String,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct ErrorTranslator {
    config: ErrorTranslationConfig,
}

impl ErrorTranslator {
    pub fn new(config: ErrorTranslationConfig) -> Self {
        Self { config }
    }

    /// Translate an internal error for the caller.
    pub fn translate(&self, err: &GatewayError) -> Translated {
        let (message, helpful_action, severity) = match err {
            GatewayError::CredentialResolution { reason } => match reason {
                CredentialFailure::Missing => (
                    "Authentication required",
                    "Provide an API key or session token",
                    Severity::Warning,
                ),
                CredentialFailure::Expired => (
                    "Your session has expired",
                    "Sign in again to continue",
                    Severity::Warning,
                ),
                CredentialFailure::Revoked => (
                    "This credential is no longer valid",
                    "Contact your administrator for a replacement",
                    Severity::Warning,
                ),
                CredentialFailure::Malformed => (
                    "The credential could not be read",
                    "Check the credential value for copy errors",
                    Severity::Warning,
                ),
                CredentialFailure::Unknown => (
                    "The credential was not recognized",
                    "Check the credential value or request a new one",
                    Severity::Warning,
                ),
                CredentialFailure::TenantInactive => (
                    "This account is currently inactive",
                    "Contact your administrator to restore access",
                    Severity::Warning,
                ),
            },
            GatewayError::CrossTenantViolation { .. } => (
                "Access to this resource is not permitted",
                "Verify you are using the correct account",
                Severity::Critical,
            ),
            GatewayError::ResourceOwnership { .. } => (
                "The requested resource was not found in your account",
                "Check the resource identifier",
                Severity::Warning,
            ),
            GatewayError::QuerySecurity { .. } => (
                "The request could not be processed",
                "Contact support if this request should have succeeded",
                Severity::Critical,
            ),
            GatewayError::ValidationTimeout { .. } => (
                "The request took too long to validate",
                "Retry the request",
                Severity::Error,
            ),
            GatewayError::Store { .. } | GatewayError::PoolExhausted => (
                "The service is temporarily unavailable",
                "Retry the request shortly",
                Severity::Error,
            ),
            _ => (
                "Something went wrong processing this request",
                "Retry the request, or contact support with the request id",
                Severity::Error,
            ),
        };

        let message = if self.config.hide_technical_details {
            message.to_string()
        } else {
            format!("{} ({})", message, err)
        };

        Translated {
            message,
            helpful_action: helpful_action.to_string(),
            severity,
        }
    }

    /// Full pipeline: translate and shape into the HTTP error.
    pub fn to_api_error(&self, err: &GatewayError, request_id: RequestId) -> ApiError {
        let translated = self.translate(err);
        if err.is_security_violation() {
            ApiError::deny(translated.message, err.violation_type())
                .with_action(translated.helpful_action)
                .with_request_id(request_id)
        } else {
            ApiError::from(err.clone()).with_request_id(request_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn translator() -> ErrorTranslator {
        ErrorTranslator::new(ErrorTranslationConfig::default())
    }

    #[test]
    fn test_expired_credential_language() {
        let out = translator().translate(&GatewayError::CredentialResolution {
            reason: CredentialFailure::Expired,
        });
        assert_eq!(out.message, "Your session has expired");
        assert_eq!(out.severity, Severity::Warning);
    }

    #[test]
    fn test_cross_tenant_is_critical_and_leaks_nothing() {
        let err = GatewayError::CrossTenantViolation {
            resource_type: "asset".into(),
            resource_id: "9f8e7d6c".into(),
        };
        let out = translator().translate(&err);
        assert_eq!(out.severity, Severity::Critical);
        assert!(!out.message.contains("9f8e7d6c"));
        assert!(!out.message.contains("asset"));
    }

    #[test]
    fn test_query_security_never_describes_the_pattern() {
        let err = GatewayError::QuerySecurity {
            pattern: "stacked statements".into(),
        };
        let out = translator().translate(&err);
        assert!(!out.message.contains("stacked"));
        assert_eq!(out.severity, Severity::Critical);
    }

    #[test]
    fn test_details_shown_when_hiding_disabled() {
        let translator = ErrorTranslator::new(ErrorTranslationConfig {
            enabled: true,
            hide_technical_details: false,
        });
        let err = GatewayError::QuerySecurity {
            pattern: "comment marker".into(),
        };
        assert!(translator.translate(&err).message.contains("comment marker"));
    }

    #[test]
    fn test_to_api_error_shapes_denies() {
        let request_id = RequestId::now_v7();
        let err = GatewayError::CrossTenantViolation {
            resource_type: "asset".into(),
            resource_id: "a-1".into(),
        };
        let api = translator().to_api_error(&err, request_id);
        assert_eq!(api.code, ErrorCode::AccessDenied);
        assert_eq!(api.violation_type.as_deref(), Some("CROSS_TENANT_BLOCKED"));
        assert_eq!(api.request_id, Some(request_id));
    }

    #[test]
    fn test_to_api_error_shapes_store_failures() {
        let api = translator().to_api_error(&GatewayError::PoolExhausted, RequestId::now_v7());
        assert_eq!(api.code, ErrorCode::ServiceUnavailable);
        assert!(api.violation_type.is_none());
    }
}
