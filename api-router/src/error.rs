use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) | AppError::InvalidPath(msg) | AppError::UnsupportedFormat(msg) => {
                Self::ValidationError(msg)
            }
            other => {
                tracing::error!(error = %other, "internal error");
                Self::InternalError(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse { error: message, status: "error".to_string() }),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, ErrorResponse { error: message, status: "error".to_string() }),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, ErrorResponse { error: message, status: "error".to_string() }),
            Self::ConfirmationRequired(message) => (StatusCode::CONFLICT, ErrorResponse { error: message, status: "confirmation_required".to_string() }),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_status_code(response: impl IntoResponse, expected_status: StatusCode) {
        assert_eq!(response.into_response().status(), expected_status);
    }

    #[test]
    fn app_error_not_found_maps_to_api_not_found() {
        let api_error = ApiError::from(AppError::NotFound("resource not found".to_string()));
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "resource not found"));
    }

    #[test]
    fn app_error_validation_maps_to_api_validation() {
        let api_error = ApiError::from(AppError::Validation("invalid input".to_string()));
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "invalid input"));
    }

    #[test]
    fn response_status_codes_match_variants() {
        assert_status_code(ApiError::InternalError("boom".into()), StatusCode::INTERNAL_SERVER_ERROR);
        assert_status_code(ApiError::NotFound("gone".into()), StatusCode::NOT_FOUND);
        assert_status_code(ApiError::ValidationError("bad".into()), StatusCode::BAD_REQUEST);
        assert_status_code(ApiError::ConfirmationRequired("confirm".into()), StatusCode::CONFLICT);
    }
}
