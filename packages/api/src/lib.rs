// ABOUTME: HTTP API layer for Sammati providing REST endpoints and routing
// ABOUTME: Integration layer over the consent engine and scheduler

use axum::{
    routing::{get, post},
    Router,
};

pub mod admin_handlers;
pub mod consents_handlers;
pub mod response;
pub mod state;

pub use state::AppState;

/// Creates the consents API router
pub fn create_consents_router() -> Router<AppState> {
    Router::new()
        .route("/consents/initiate", post(consents_handlers::initiate))
        .route("/consents/submit", post(consents_handlers::submit))
        .route("/consents/validate", get(consents_handlers::validate))
        .route(
            "/consents/validate-bulk",
            post(consents_handlers::validate_bulk),
        )
        .route("/consents/renew", post(consents_handlers::renew))
        .route(
            "/consents/renew/{renewal_id}/confirm",
            post(consents_handlers::confirm_renewal),
        )
        .route(
            "/consents/{cms_request_id}",
            get(consents_handlers::get_notice),
        )
        .route(
            "/{fiduciary_id}/consents/{artifact_id}/withdraw",
            post(consents_handlers::withdraw),
        )
}

/// Creates the admin API router for scheduler operations
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/scheduler/status", get(admin_handlers::scheduler_status))
        .route(
            "/admin/scheduler/run-reminders",
            post(admin_handlers::run_reminders),
        )
        .route(
            "/admin/scheduler/run-expiry",
            post(admin_handlers::run_expiry),
        )
}

/// Creates the full application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(admin_handlers::health))
        .merge(create_consents_router())
        .merge(create_admin_router())
        .with_state(state)
}
