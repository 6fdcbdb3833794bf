//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use crate::scheduler::ReconcilerStatus;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: &'static str,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse { status: "ok" })
}

/// Daemon status response
#[derive(Debug, Serialize)]
pub struct DaemonStatusResponse {
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub identities: usize,
    pub active_identities: usize,
    #[serde(flatten)]
    pub scheduler: ReconcilerStatus,
}

/// Daemon status endpoint
pub async fn daemon_status(
    State(state): State<AppState>,
) -> ApiResult<Json<DaemonStatusResponse>> {
    let identities = state.storage.list_identities().await?;
    let active = identities.iter().filter(|i| i.active).count();

    Ok(Json(DaemonStatusResponse {
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        identities: identities.len(),
        active_identities: active,
        scheduler: state.scheduler.status().await,
    }))
}
