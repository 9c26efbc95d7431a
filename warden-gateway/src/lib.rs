//! WARDEN Gateway - Tenant Isolation Enforcement Layer
//!
//! The HTTP-facing crate: axum middleware that resolves credentials,
//! validates resource ownership through the shadow dual-path engine,
//! records audit attempts, and translates every denial into a
//! non-technical message. Store access goes through narrow
//! `async_trait` seams so the whole pipeline runs against in-memory
//! fakes in tests.

pub mod audit;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod ownership;
pub mod resolver;
pub mod routes;
pub mod shadow;
pub mod state;
pub mod store;
pub mod translate;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{isolation_middleware, AuthContext, AuthExtractor};
pub use shadow::{ShadowEngine, ShadowOutcome, ValidationRequest};
pub use state::GatewayState;
pub use translate::ErrorTranslator;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the gateway router. Everything under `/api` sits behind the
/// isolation middleware; `/health` stays open for probes.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/stats", get(routes::stats))
        .route("/api/v1/query/prepare", post(routes::prepare_query))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            isolation_middleware,
        ))
        .route("/health", get(routes::health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
