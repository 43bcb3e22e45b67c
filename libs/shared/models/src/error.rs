use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure kinds surfaced by the queue, scheduler and orchestrator cores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status transition from {from} to {to}")]
    StateError { from: String, to: String },

    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("No capacity: {0}")]
    CapacityError(String),

    #[error("{entity} not found: {id}")]
    NotFoundError { entity: &'static str, id: String },
}

impl FlowError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        FlowError::NotFoundError {
            entity,
            id: id.to_string(),
        }
    }

    pub fn state(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        FlowError::StateError {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Optimistic-lock and overlap failures; callers may retry against another candidate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FlowError::ConflictError(_))
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        let message = err.to_string();
        match err {
            FlowError::ValidationError(_) => AppError::ValidationError(message),
            FlowError::StateError { .. } | FlowError::ConflictError(_) => AppError::Conflict(message),
            FlowError::CapacityError(_) => AppError::Unavailable(message),
            FlowError::NotFoundError { .. } => AppError::NotFound(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        tracing::error!("Error: {}: {}", status, message);

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
