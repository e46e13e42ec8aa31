use crate::handlers::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bookbase_database::DbError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing or invalid admin token")]
    Unauthorized,

    #[error("Migration routes are disabled: no admin token configured")]
    Forbidden,
}

/// Maps errors to a status code and an `ApiResponse` body. Backend failures
/// are logged with their provider and reported without details.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            ApiError::Database(DbError::IntegrityRefusal(refusal)) => (
                StatusCode::CONFLICT,
                refusal.to_string(),
                serde_json::to_value(&refusal).ok(),
            ),
            ApiError::Database(err @ DbError::ConfirmationRequired { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string(), None)
            }
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                    None,
                )
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            err @ ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            err @ ApiError::Forbidden => (StatusCode::FORBIDDEN, err.to_string(), None),
        };

        let body = ApiResponse {
            success: false,
            data,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}
