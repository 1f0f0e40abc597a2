//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{UnknownRole, UnknownStatus};

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Token error: {0}")]
    Token(#[from] crate::auth::TokenError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<UnknownRole> for AppError {
    fn from(err: UnknownRole) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<UnknownStatus> for AppError {
    fn from(err: UnknownStatus) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // 401 Unauthorized
            AppError::AuthenticationRequired => {
                (StatusCode::UNAUTHORIZED, "authentication_required", None)
            }
            AppError::AuthenticationFailed(msg) => {
                (StatusCode::UNAUTHORIZED, "authentication_failed", Some(msg.clone()))
            }

            // 403 Forbidden
            AppError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InvalidOperation(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_operation", Some(msg.clone()))
                    }
                    DomainError::NotFound { resource, id } => {
                        (StatusCode::NOT_FOUND, "not_found", Some(format!("{} {}", resource, id)))
                    }
                    DomainError::Denied(msg) => {
                        (StatusCode::FORBIDDEN, "access_denied", Some(msg.clone()))
                    }
                    DomainError::Duplicate { resource, field, value } => {
                        (StatusCode::CONFLICT, "duplicate_resource", Some(format!("{} with {} '{}' already exists", resource, field, value)))
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Token(e) => {
                tracing::error!("Token error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "token_error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn test_domain_error_status_mapping() {
        let cases = [
            (
                AppError::Domain(DomainError::invalid_operation("bad move")),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Domain(DomainError::not_found("user", "abc")),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Domain(DomainError::denied("no")),
                StatusCode::FORBIDDEN,
            ),
            (
                AppError::Domain(DomainError::duplicate("user", "email", "a@b.c")),
                StatusCode::CONFLICT,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        assert_eq!(
            AppError::AuthenticationRequired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::AuthenticationFailed("invalid email or password".into())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
