//! API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use labbook_core::CoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Core(#[from] CoreError),
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            ApiError::Core(core) => match core {
                CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
                CoreError::Geolocation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "geolocation_error")
                }
                CoreError::NotServiceable(_) => (StatusCode::CONFLICT, "not_serviceable"),
                CoreError::SlotUnavailable(_) => (StatusCode::CONFLICT, "slot_unavailable"),
                CoreError::InvalidSignature => (StatusCode::BAD_REQUEST, "invalid_signature"),
                CoreError::Vendor { .. } => (StatusCode::BAD_GATEWAY, "vendor_error"),
                CoreError::Payment(_) => (StatusCode::BAD_GATEWAY, "payment_error"),
                CoreError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
                CoreError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
                CoreError::Serialization(_) | CoreError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_kind();

        // Internal details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
