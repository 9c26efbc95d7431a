//! HTTP handlers.
//!
//! The gateway's own surface is deliberately small: a health probe, an
//! operational stats endpoint, and a query-preparation endpoint that
//! hands callers a tenant-scoped rendition of their SQL. Everything
//! else sits behind the isolation middleware.

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::GatewayState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_sql::augment;

// ============================================================================
// HEALTH
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: serde_json::Value,
    pub audit: serde_json::Value,
    pub shadow: ShadowStats,
}

#[derive(Debug, Serialize)]
pub struct ShadowStats {
    pub runs: u64,
    pub match_rate_pct: f64,
    pub improvement_rate_pct: f64,
}

pub async fn stats(
    State(state): State<GatewayState>,
    AuthExtractor(_auth): AuthExtractor,
) -> ApiResult<Json<StatsResponse>> {
    let cache = state.cache.stats();
    let audit = state.audit.stats();
    let tracker = state.engine.tracker();

    Ok(Json(StatsResponse {
        cache: serde_json::json!({
            "validation": snapshot_json(&cache.validation),
            "tenant_info": snapshot_json(&cache.tenant_info),
            "permission": snapshot_json(&cache.permission),
            "combined_hit_rate_pct": cache.combined_hit_rate_pct(),
        }),
        audit: serde_json::json!({
            "enqueued": audit.enqueued,
            "written": audit.written,
            "dropped": audit.dropped,
            "write_failures": audit.write_failures,
        }),
        shadow: ShadowStats {
            runs: tracker.runs(),
            match_rate_pct: tracker.match_rate_pct(),
            improvement_rate_pct: tracker.improvement_rate_pct(),
        },
    }))
}

fn snapshot_json(snapshot: &warden_cache::CacheStatsSnapshot) -> serde_json::Value {
    serde_json::json!({
        "hits": snapshot.hits,
        "misses": snapshot.misses,
        "evictions": snapshot.evictions,
        "expirations": snapshot.expirations,
        "hit_rate_pct": snapshot.hit_rate_pct(),
    })
}

// ============================================================================
// QUERY PREPARATION
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PrepareRequest {
    pub sql: String,
}

/// Tenant-scoped rendition of a caller's statement. The caller binds
/// its own parameters, then the tenant id at `tenant_param`.
#[derive(Debug, Serialize)]
pub struct PrepareResponse {
    pub sql: String,
    pub tenant_param: Option<u32>,
    pub tenant_id: String,
    pub augmented_tables: Vec<String>,
}

/// Rewrite a statement so every tenant-scoped table it touches carries
/// the caller's tenant predicate. Denied statements surface as 403
/// `QUERY_SECURITY_VIOLATION` without echoing the statement back.
pub async fn prepare_query(
    State(state): State<GatewayState>,
    AuthExtractor(auth): AuthExtractor,
    Json(body): Json<PrepareRequest>,
) -> ApiResult<Json<PrepareResponse>> {
    if body.sql.trim().is_empty() {
        return Err(ApiError::invalid_request("sql must not be empty"));
    }

    let augmented = augment(&body.sql, &state.registry)
        .map_err(|err| state.translator.to_api_error(&err, auth.request_id))?;

    debug!(
        tenant_id = %auth.tenant.tenant_id,
        tables = augmented.augmented_tables.len(),
        "statement prepared"
    );

    Ok(Json(PrepareResponse {
        sql: augmented.sql,
        tenant_param: augmented.tenant_param,
        tenant_id: auth.tenant.tenant_id.to_string(),
        augmented_tables: augmented.augmented_tables,
    }))
}
