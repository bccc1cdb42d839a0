//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::SchedulerError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// The request is valid but cannot be served right now
    Conflict(String),
    /// A worker node or collaborating service failed
    BadGateway(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        let message = err.to_string();
        match err {
            SchedulerError::NotFound(_) => ApiError::NotFound(message),
            SchedulerError::NoEnvironment(_) | SchedulerError::InvalidEnvironment(_) => {
                ApiError::BadRequest(message)
            }
            SchedulerError::NotEnoughMemory { .. }
            | SchedulerError::ResourcesLocked(_)
            | SchedulerError::NoRunner(_)
            | SchedulerError::Unavailable(_) => ApiError::Conflict(message),
            SchedulerError::WorkerUnreachable { .. }
            | SchedulerError::Worker { .. }
            | SchedulerError::Collaborator { .. } => ApiError::BadGateway(message),
            SchedulerError::Build(_) | SchedulerError::StartFailed(_) => {
                ApiError::InternalError(message)
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
