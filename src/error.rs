use crate::repositories::user_repository::RepositoryError;
use crate::services::{
    auth_service::AuthServiceError, oauth_service::OAuthError, session_service::SessionError,
    user_service::UserServiceError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Not found")]
    NotFound,

    #[error("Login with the identity provider failed")]
    OAuthFailed,

    #[error("Internal server error")]
    InternalError,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(e) => AppError::Database(e),
            RepositoryError::NotFound => AppError::NotFound,
            RepositoryError::Conflict => AppError::EmailTaken,
        }
    }
}

impl From<UserServiceError> for AppError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::InvalidEmail | UserServiceError::EmptyPassword => {
                AppError::Validation(err.to_string())
            }
            UserServiceError::EmailTaken => AppError::EmailTaken,
            UserServiceError::InvalidToken => AppError::InvalidToken,
            UserServiceError::Hashing(e) => {
                tracing::error!("{}", e);
                AppError::InternalError
            }
            UserServiceError::RepositoryError(e) => e.into(),
        }
    }
}

impl From<AuthServiceError> for AppError {
    fn from(err: AuthServiceError) -> Self {
        match err {
            AuthServiceError::InvalidCredentials => AppError::InvalidCredentials,
            AuthServiceError::UserNotFound => AppError::NotFound,
            AuthServiceError::Hashing(e) => {
                tracing::error!("{}", e);
                AppError::InternalError
            }
            AuthServiceError::RepositoryError(e) => e.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(_) | OAuthError::NotConfigured(_) => AppError::NotFound,
            OAuthError::Database(e) => AppError::Database(e),
            other => {
                tracing::warn!("OAuth login failed: {}", other);
                AppError::OAuthFailed
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidToken | AppError::OAuthFailed => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::EmailTaken => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, error_message).into_response()
    }
}
