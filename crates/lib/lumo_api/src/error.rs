//! Application error types and HTTP status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use lumo_core::auth::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Handler-level error: the domain taxonomy plus its HTTP rendering.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Auth(err) = self;

        // Storage and signing failures keep their detail in the log and
        // cross the boundary as one opaque line.
        let message = match &err {
            AuthError::Db(_) | AuthError::Internal(_) => {
                error!(error = %err, "internal error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let (status, code, fields) = match err {
            AuthError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(errors))
            }
            AuthError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "invalid_credentials", None)
            }
            AuthError::AlreadyRegistered => (StatusCode::CONFLICT, "already_registered", None),
            AuthError::CodeRequestTimeout => {
                (StatusCode::TOO_MANY_REQUESTS, "code_request_timeout", None)
            }
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "not_found", None),
            AuthError::InvalidCode => (StatusCode::BAD_REQUEST, "invalid_code", None),
            AuthError::LinkExpired => (StatusCode::GONE, "link_expired", None),
            AuthError::TokenNotFound => (StatusCode::UNAUTHORIZED, "token_not_found", None),
            AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "token_revoked", None),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired", None),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AuthError::Db(_) | AuthError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message,
            fields,
        });
        (status, body).into_response()
    }
}
