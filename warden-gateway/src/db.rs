//! PostgreSQL store backend.
//!
//! Connection pooling plus the production implementations of the store
//! seams. Credential lookups go by fingerprint column, never by raw
//! value; ownership probes are built from registry bindings, so every
//! interpolated identifier comes from startup configuration, and the
//! untrusted resource id always travels as a bound parameter.

use crate::store::{AuditStore, CredentialStore, OwnershipProbe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;
use warden_core::{
    Credential, CredentialKind, CredentialRecord, GatewayError, GatewayResult, StoreConfig,
    TableBinding, TenantContext, TenantId, UserId, ValidationAttempt,
};

// ============================================================================
// POOL
// ============================================================================

/// Create a connection pool from the validated store configuration.
pub fn create_pool(config: &StoreConfig) -> GatewayResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());

    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    // Bounded pool: acquisition waits up to the connect timeout and then
    // fails as pool exhaustion instead of queueing forever.
    let mut pool_config = PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(config.connect_timeout);
    pool_config.timeouts.create = Some(config.connect_timeout);
    cfg.pool = Some(pool_config);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| GatewayError::Store {
            reason: format!("failed to create pool: {}", e),
        })
}

fn pool_err(err: deadpool_postgres::PoolError) -> GatewayError {
    tracing::error!(error = ?err, "connection pool error");
    match err {
        deadpool_postgres::PoolError::Timeout(_) => GatewayError::PoolExhausted,
        _ => GatewayError::Store {
            reason: "failed to acquire connection".to_string(),
        },
    }
}

fn db_err(err: tokio_postgres::Error) -> GatewayError {
    tracing::error!(error = ?err, "database error");
    GatewayError::Store {
        reason: "database operation failed".to_string(),
    }
}

// ============================================================================
// STORE CLIENT
// ============================================================================

/// How far a session token's expiry slides forward on use.
const SESSION_SLIDE_MINUTES: i32 = 30;

/// Production store client backed by the connection pool.
#[derive(Clone)]
pub struct StoreClient {
    pool: Pool,
}

impl StoreClient {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> GatewayResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(pool_err)
    }
}

#[async_trait]
impl CredentialStore for StoreClient {
    async fn fetch_credential(
        &self,
        credential: &Credential,
    ) -> GatewayResult<Option<CredentialRecord>> {
        let (table, column) = match credential.kind() {
            CredentialKind::ApiKey => ("api_keys", "key_fingerprint"),
            CredentialKind::SessionToken => ("sessions", "token_fingerprint"),
        };
        let sql = format!(
            "SELECT tenant_id, user_id, expires_at, revoked, scopes \
             FROM {} WHERE {} = $1",
            table, column
        );

        let client = self.client().await?;
        let row = client
            .query_opt(&sql, &[&credential.fingerprint()])
            .await
            .map_err(db_err)?;

        Ok(row.map(|row| {
            let tenant_id: Uuid = row.get(0);
            let user_id: Option<Uuid> = row.get(1);
            let expires_at: Option<DateTime<Utc>> = row.get(2);
            let scopes: Vec<String> = row.get(4);
            CredentialRecord {
                tenant_id: TenantId::new(tenant_id),
                user_id: user_id.map(UserId::new),
                expires_at,
                revoked: row.get(3),
                scopes,
            }
        }))
    }

    async fn fetch_tenant(&self, tenant_id: TenantId) -> GatewayResult<Option<TenantContext>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT tenant_id, business_key, active FROM tenants WHERE tenant_id = $1",
                &[&tenant_id.as_uuid()],
            )
            .await
            .map_err(db_err)?;

        Ok(row.map(|row| {
            let tenant_id: Uuid = row.get(0);
            TenantContext {
                tenant_id: TenantId::new(tenant_id),
                business_key: row.get(1),
                active: row.get(2),
            }
        }))
    }

    async fn extend_session(&self, credential: &Credential) -> GatewayResult<bool> {
        if !matches!(credential.kind(), CredentialKind::SessionToken) {
            return Ok(false);
        }
        // Only slides a live, unrevoked session, and only forward.
        let client = self.client().await?;
        let updated = client
            .execute(
                "UPDATE sessions \
                 SET expires_at = now() + make_interval(mins => $2) \
                 WHERE token_fingerprint = $1 \
                   AND revoked = false \
                   AND expires_at IS NOT NULL \
                   AND expires_at > now() \
                   AND expires_at < now() + make_interval(mins => $2)",
                &[&credential.fingerprint(), &SESSION_SLIDE_MINUTES],
            )
            .await
            .map_err(db_err)?;
        Ok(updated > 0)
    }
}

#[async_trait]
impl OwnershipProbe for StoreClient {
    async fn row_owned_by_tenant(
        &self,
        binding: &TableBinding,
        resource_id: &str,
        tenant_id: TenantId,
    ) -> GatewayResult<bool> {
        // Table and column names come from the startup registry, never
        // from the request; only the id and tenant are parameters.
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {}::text = $1 AND {} = $2)",
            binding.table, binding.id_column, binding.tenant_column
        );
        let client = self.client().await?;
        let row = client
            .query_one(&sql, &[&resource_id, &tenant_id.as_uuid()])
            .await
            .map_err(db_err)?;
        Ok(row.get(0))
    }

    async fn row_exists(&self, binding: &TableBinding, resource_id: &str) -> GatewayResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {}::text = $1)",
            binding.table, binding.id_column
        );
        let client = self.client().await?;
        let row = client
            .query_one(&sql, &[&resource_id])
            .await
            .map_err(db_err)?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl AuditStore for StoreClient {
    async fn record_attempts(&self, attempts: &[ValidationAttempt]) -> GatewayResult<()> {
        if attempts.is_empty() {
            return Ok(());
        }
        let client = self.client().await?;
        let statement = client
            .prepare_cached(
                "INSERT INTO audit_log \
                 (request_id, credential_fingerprint, tenant_id, endpoint, \
                  legacy_success, enhanced_success, results_match, \
                  performance_improvement_ms, cross_tenant_blocked, cache_hit, \
                  token_extended, detail, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .await
            .map_err(db_err)?;

        for attempt in attempts {
            client
                .execute(
                    &statement,
                    &[
                        &attempt.request_id.as_uuid(),
                        &attempt.credential_fingerprint,
                        &attempt.tenant_id.map(|t| t.as_uuid()),
                        &attempt.endpoint,
                        &attempt.legacy.success,
                        &attempt.enhanced.success,
                        &attempt.results_match,
                        &attempt.performance_improvement_ms,
                        &attempt.cross_tenant_blocked,
                        &attempt.cache_hit,
                        &attempt.token_extended,
                        &attempt.enhanced_payload,
                        &attempt.timestamp,
                    ],
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "audit insert failed");
                    GatewayError::AuditWrite {
                        reason: "audit insert failed".to_string(),
                    }
                })?;
        }
        Ok(())
    }
}
