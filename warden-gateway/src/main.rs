//! WARDEN Gateway Server Entry Point
//!
//! Bootstraps configuration, connects the Postgres-backed store, spawns
//! the cache tuner and audit writer, and starts the Axum HTTP server
//! with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use warden_cache::{ttl_tuner_task, TunerPolicy};
use warden_gateway::db::{create_pool, StoreClient};
use warden_gateway::{audit, router, ApiError, ApiResult, GatewayState};
use warden_core::GatewayConfig;

/// Time allowed for the audit writer to flush after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = GatewayConfig::from_env()?;
    config.validate()?;

    let pool = create_pool(&config.store)?;
    let store = Arc::new(StoreClient::new(pool));

    let state = GatewayState::new(config, store.clone(), store.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tuner = tokio::spawn(ttl_tuner_task(
        state.cache.tuned_caches(),
        TunerPolicy::from_settings(&state.config.cache, state.config.performance.cache_hit_target_pct),
        shutdown_rx.clone(),
    ));
    let audit_writer = tokio::spawn(audit::audit_writer_task(
        state.audit.clone(),
        store,
        shutdown_rx,
    ));

    let app = router(state);
    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "starting WARDEN gateway");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal(format!("failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal(format!("server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Stop background tasks and give the audit writer time to flush.
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = audit_writer.await;
        let _ = tuner.await;
    })
    .await;

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("WARDEN_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("WARDEN_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_request(format!("invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_request(format!("invalid bind address {}: {}", addr, e)))
}
