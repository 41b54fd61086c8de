use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("order {0} is already closed")]
    AlreadyClosed(Uuid),

    #[error("order {0} is no longer available: another driver claimed it first")]
    ConcurrentClaimLost(Uuid),

    #[error("registry sync failure: {0}")]
    RegistrySyncFailure(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short outcome label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyClosed(_) => "already_closed",
            AppError::ConcurrentClaimLost(_) => "claim_lost",
            AppError::RegistrySyncFailure(_) => "registry_sync_failure",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTransition(_)
            | AppError::AlreadyClosed(_)
            | AppError::ConcurrentClaimLost(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RegistrySyncFailure(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
