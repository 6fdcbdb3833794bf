//! Operator-triggered reconciliation passes

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{extract::State, Json};
use guildlink_types::PassReport;

/// Run a validation pass now
pub async fn run_validation(State(state): State<AppState>) -> ApiResult<Json<PassReport>> {
    tracing::info!("Validation pass requested via API");
    let report = state.scheduler.run_validation_pass().await?;
    Ok(Json(report))
}

/// Run a token refresh pass now
pub async fn run_refresh(State(state): State<AppState>) -> ApiResult<Json<PassReport>> {
    tracing::info!("Refresh pass requested via API");
    let report = state.scheduler.run_refresh_pass().await?;
    Ok(Json(report))
}
