//! Error types for guildlink-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Outbound client setup error
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (e.g., already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors talking to the validation server, Discord OAuth2 or the Discord API
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network failure or timeout
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// OAuth2 error other than a revocation
    #[error("Provider error {error}: {}", .description.as_deref().unwrap_or("no description"))]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// Response was well-formed but not what the protocol requires
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client could not be configured
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for outbound calls
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors surfaced by the reconciliation scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// start() called while already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// A pass of the same kind has not finished yet
    #[error("A {0} pass is already in progress")]
    PassInProgress(guildlink_types::PassKind),

    /// Batch-level storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Batch-level upstream failure
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request failed the state check
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Upstream error
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning | SchedulerError::PassInProgress(_) => {
                ApiError::Conflict(err.to_string())
            }
            SchedulerError::Storage(e) => ApiError::Storage(e),
            SchedulerError::Upstream(e) => ApiError::Upstream(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(StorageError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
