//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::error::ApiError;
use axum::{
    http::Uri,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
///
/// Only the linking routes are bounded by the request timeout; operator
/// passes run for as long as the guild is large.
pub fn create_router(state: AppState) -> Router {
    let discord_routes = Router::new()
        .route("/auth", get(handlers::discord_auth))
        .route("/auth/callback", get(handlers::discord_auth_callback))
        .layer(TimeoutLayer::new(state.request_timeout));

    let operator_routes = Router::new()
        .route("/status", get(handlers::daemon_status))
        .route("/reconcile/validation", post(handlers::run_validation))
        .route("/reconcile/refresh", post(handlers::run_refresh));

    Router::new()
        .route("/api/healthcheck", get(handlers::health_check))
        .nest("/api/discord/v1", discord_routes)
        .nest("/api/v1", operator_routes)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
