//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// Create the full API router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health_routes(state.clone()))
        .merge(provider_routes(state.clone()))
        .merge(user_routes(state))
}

/// Health and status routes
fn health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        .route("/status", get(handlers::service_status))
        .with_state(state)
}

/// Provider CRUD, connectivity tests, and the OIDC callback
fn provider_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/providers",
            get(handlers::providers::list_providers).post(handlers::providers::create_provider),
        )
        .route(
            "/providers/{id}",
            get(handlers::providers::get_provider)
                .put(handlers::providers::update_provider)
                .delete(handlers::providers::delete_provider),
        )
        .route("/providers/{id}/test", post(handlers::providers::test_provider))
        .route(
            "/providers/{id}/callback",
            get(handlers::providers::oidc_callback),
        )
        .with_state(state)
}

/// Directory user routes
fn user_routes(state: AppState) -> Router {
    Router::new()
        .route("/users", get(handlers::users::list_users))
        .route("/users/{id}/link", post(handlers::users::link_user))
        .route("/users/sync", post(handlers::users::trigger_sync))
        .with_state(state)
}
