//! JSON error responses.

use crate::core::errors::ServiceError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(true);

/// Controls whether 500 responses carry the underlying error text. Off in production.
pub fn expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `not_found`.
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// No credential presented.
    Unauthorized(String),
    /// Credential presented but invalid or expired.
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => {
                error!("internal error: {msg}");
                let msg = if EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
                    msg
                } else {
                    "internal server error".to_owned()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) | ServiceError::InvalidState(msg) => {
                ApiError::BadRequest(msg)
            }
            ServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            // foreign conversations look exactly like missing ones
            ServiceError::Forbidden => ApiError::NotFound("conversation not found".to_owned()),
            ServiceError::Conflict(msg) => ApiError::Conflict(msg),
            ServiceError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}
