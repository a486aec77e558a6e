//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Prefix of every API route.
pub const API_PREFIX: &str = "/api/v4";

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers and probes)
        .route("/health", get(handlers::health_check))
        // CDNs
        .route("/cdns", get(handlers::list_cdns).post(handlers::create_cdn))
        .route("/cdns/{id}", get(handlers::get_cdn))
        // CDN locks
        .route(
            "/cdn_locks",
            get(handlers::list_locks)
                .post(handlers::create_lock)
                .delete(handlers::delete_lock),
        )
        // Profiles
        .route(
            "/profiles",
            get(handlers::list_profiles).post(handlers::create_profile),
        )
        .route("/profiles/copy", post(handlers::copy_profile))
        .route("/profiles/import", post(handlers::import_profile))
        .route(
            "/profiles/{id}",
            put(handlers::update_profile).delete(handlers::delete_profile),
        )
        .route(
            "/profiles/{id}/export",
            get(handlers::export_profile).post(handlers::export_profile),
        )
        // Parameters
        .route(
            "/parameters",
            get(handlers::list_parameters).post(handlers::create_parameter),
        )
        .route("/parameters/{id}", delete(handlers::delete_parameter))
        .route(
            "/profileparameters",
            post(handlers::create_profile_parameters),
        )
        // Tokens (admin)
        .route(
            "/tokens",
            get(handlers::list_tokens).post(handlers::create_token),
        )
        .route("/tokens/{token_id}", delete(handlers::revoke_token));

    let mut router = Router::new().nest(API_PREFIX, api_routes);

    // SECURITY: when enabled, /metrics must be network-restricted to
    // Prometheus scrapers. See crate::metrics.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
