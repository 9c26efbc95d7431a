//! Axum middleware for tenant isolation enforcement.
//!
//! Every request passes through `isolation_middleware`:
//! - Extracts a credential (Bearer token, X-API-Key, cookie, or query
//!   parameter, in that order of precedence)
//! - Runs shadow dual-path validation and ownership checks
//! - Records exactly one audit attempt per request, allowed or denied
//! - Injects `AuthContext` into request extensions on allow
//! - Returns a translated 403 on deny, never a technical message

use crate::error::ApiError;
use crate::extract::{claimed_tenant_from_query, resources_from_request};
use crate::shadow::ValidationRequest;
use crate::state::GatewayState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::HeaderName, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;
use warden_core::{
    AuthMechanisms, Credential, CredentialFailure, CredentialRecord, GatewayError, RequestId,
    TenantContext, TenantId, ValidationAttempt,
};

/// Cookie carrying a session token.
const SESSION_COOKIE: &str = "warden_session";

/// Query parameter carrying an API key, disabled by default.
const API_KEY_PARAM: &str = "api_key";

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// Validated caller identity, injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub request_id: RequestId,
    pub tenant: TenantContext,
    pub record: CredentialRecord,
}

impl AuthContext {
    /// Coarse access level derived from credential scopes, surfaced in
    /// the `x-access-level` response header.
    pub fn access_level(&self) -> &'static str {
        if self.record.scopes.iter().any(|s| s == "admin") {
            "admin"
        } else {
            "standard"
        }
    }
}

/// Typed extractor for handlers that require a validated caller.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                ApiError::internal(
                    "AuthContext missing from request extensions; \
                     is the isolation middleware applied to this route?",
                )
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// CREDENTIAL EXTRACTION
// ============================================================================

/// Pull a credential from the request, honoring the configured
/// mechanisms. Precedence: Bearer, X-API-Key, cookie, query parameter.
fn extract_credential(mechanisms: &AuthMechanisms, request: &Request) -> Option<Credential> {
    let headers = request.headers();

    if mechanisms.bearer {
        if let Some(token) = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
        {
            return Some(Credential::session_token(token));
        }
    }

    if mechanisms.api_key {
        if let Some(key) = headers.get("x-api-key").and_then(|h| h.to_str().ok()) {
            return Some(Credential::api_key(key));
        }
    }

    if mechanisms.cookie {
        if let Some(cookies) = headers.get("cookie").and_then(|h| h.to_str().ok()) {
            for cookie in cookies.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == SESSION_COOKIE && !value.is_empty() {
                        return Some(Credential::session_token(value));
                    }
                }
            }
        }
    }

    if mechanisms.query_param {
        if let Some(query) = request.uri().query() {
            for pair in query.split('&') {
                if let Some((name, value)) = pair.split_once('=') {
                    if name == API_KEY_PARAM && !value.is_empty() {
                        return Some(Credential::api_key(value));
                    }
                }
            }
        }
    }

    None
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

pub async fn isolation_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let request_id = RequestId::now_v7();
    let endpoint = request.uri().path().to_string();

    let Some(credential) = extract_credential(&state.config.auth, &request) else {
        let err = GatewayError::credential(CredentialFailure::Missing);
        state.audit.record(ValidationAttempt::unresolved(
            request_id,
            String::new(),
            &endpoint,
            err.violation_type(),
        ));
        return Err(state.translator.to_api_error(&err, request_id));
    };
    let fingerprint = credential.fingerprint();

    let resources = resources_from_request(
        &state.registry,
        request.uri().path(),
        request.uri().query(),
    );
    let tenant_claim = request.uri().query().and_then(claimed_tenant_from_query);
    let validation = ValidationRequest {
        credential,
        resources,
    };

    let outcome = state.engine.run(&validation).await;

    // An explicit tenant_id parameter must name the tenant the caller
    // actually resolved to; anything else is a cross-tenant attempt.
    let claim_violation = match (&outcome.decision, &tenant_claim) {
        (Ok(decision), Some(claimed)) if !claim_matches(claimed, decision.tenant.tenant_id) => {
            warn!(
                endpoint = %endpoint,
                "tenant_id parameter does not match the resolved tenant"
            );
            Some(GatewayError::CrossTenantViolation {
                resource_type: "tenant".to_string(),
                resource_id: claimed.clone(),
            })
        }
        _ => None,
    };

    let attempt = ValidationAttempt {
        request_id,
        credential_fingerprint: fingerprint,
        tenant_id: outcome
            .decision
            .as_ref()
            .ok()
            .map(|decision| decision.tenant.tenant_id),
        endpoint: endpoint.clone(),
        legacy: outcome.legacy.clone(),
        enhanced: outcome.enhanced.clone(),
        enhanced_payload: outcome.enhanced_payload.clone(),
        results_match: outcome.results_match,
        performance_improvement_ms: outcome.performance_improvement_ms,
        cross_tenant_blocked: claim_violation.is_some()
            || matches!(
                outcome.decision,
                Err(GatewayError::CrossTenantViolation { .. })
            ),
        cache_hit: outcome.cache_hit,
        token_extended: outcome.token_extended,
        timestamp: Utc::now(),
    };
    state.audit.record(attempt);

    if let Some(err) = claim_violation {
        return Err(state.translator.to_api_error(&err, request_id));
    }
    let decision = match outcome.decision {
        Ok(decision) => decision,
        Err(err) => return Err(state.translator.to_api_error(&err, request_id)),
    };

    let context = AuthContext {
        request_id,
        tenant: decision.tenant,
        record: decision.record,
    };
    let access_level = context.access_level();
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    if elapsed_ms > state.config.performance.total_middleware_ms {
        warn!(
            endpoint = %endpoint,
            elapsed_ms,
            budget_ms = state.config.performance.total_middleware_ms,
            "validation exceeded middleware latency budget"
        );
    }
    let risk_score = if outcome.results_match { "0" } else { "25" };
    set_header(&mut response, "x-security-status", "validated");
    set_header(&mut response, "x-risk-score", risk_score);
    set_header(&mut response, "x-access-level", access_level);
    set_header(&mut response, "x-validation-time-ms", &elapsed_ms.to_string());
    set_header(&mut response, "x-request-id", &request_id.to_string());

    Ok(response)
}

/// A claimed tenant id matches only when it parses to exactly the
/// resolved tenant; garbage never matches.
fn claim_matches(claimed: &str, resolved: TenantId) -> bool {
    Uuid::parse_str(claimed)
        .map(|uuid| TenantId::new(uuid) == resolved)
        .unwrap_or(false)
}

fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(name), value);
    }
}

// ============================================================================
// TESTS
// ============================================================================
