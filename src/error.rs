use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("route builder timed out after {0} ms")]
    BuilderTimeout(u64),

    #[error("route builder failed: {0}")]
    RouteBuild(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable tag for the failure kind. Clients branch on this and the HTTP
    /// status, never on the detail text.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::InvalidState(_) => "invalid_state",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::DriverUnavailable(_) => "driver_unavailable",
            AppError::Conflict(_) => "conflict",
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::BuilderTimeout(_) => "builder_timeout",
            AppError::RouteBuild(_) => "route_build_failed",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidState(_)
            | AppError::InvalidTransition(_)
            | AppError::DriverUnavailable(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BuilderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::RouteBuild(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "detail": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
