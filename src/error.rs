use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::response::ApiResponse;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid identifier or password")]
    InvalidCredentials,

    #[error("account is locked due to too many failed attempts")]
    AccountLocked,

    #[error("email or username already exists")]
    IdentifierTaken,

    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("user not found")]
    UserNotFound,

    #[error("birth date cannot be in the future")]
    BirthDateInFuture,

    #[error("token invalid, please log in again")]
    TokenInvalid,

    #[error("token does not belong to the requested account")]
    TokenAccountMismatch,

    #[error("password is required for password type switch")]
    PasswordRequired,

    #[error("stored token is required for token type switch")]
    StoredTokenRequired,

    #[error("invalid request data")]
    Validation(serde_json::Value),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("too many requests")]
    RateLimited,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("chat store error: {0}")]
    ChatStore(String),

    #[error("message bus error: {0}")]
    Bus(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Public error code rendered in the response envelope. Storage and bus
    /// failures collapse to INTERNAL_ERROR; callers never see their detail.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials => "AUTH001",
            AppError::AccountLocked => "AUTH002",
            AppError::IdentifierTaken => "AUTH003",
            AppError::InvalidRefreshToken => "AUTH004",
            AppError::UserNotFound => "AUTH005",
            AppError::BirthDateInFuture => "AUTH006",
            AppError::TokenInvalid => "AUTH007",
            AppError::TokenAccountMismatch => "AUTH008",
            AppError::PasswordRequired => "AUTH009",
            AppError::StoredTokenRequired => "AUTH010",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound => "NOT_FOUND",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::Database(_)
            | AppError::ChatStore(_)
            | AppError::Bus(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::AccountLocked
            | AppError::InvalidRefreshToken
            | AppError::UserNotFound
            | AppError::TokenInvalid
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::IdentifierTaken
            | AppError::BirthDateInFuture
            | AppError::TokenAccountMismatch
            | AppError::PasswordRequired
            | AppError::StoredTokenRequired
            | AppError::Validation(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_)
            | AppError::ChatStore(_)
            | AppError::Bus(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            // Lockout state is deliberately disclosed so a legitimate user
            // knows to wait instead of retrying.
            AppError::AccountLocked => Some(json!({ "locked": true })),
            AppError::IdentifierTaken => {
                Some(json!({ "field": "email", "reason": "already_exists" }))
            }
            AppError::TokenInvalid => Some(json!({ "require_password": true })),
            AppError::Validation(details) => Some(details.clone()),
            _ => None,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_)
            | AppError::ChatStore(_)
            | AppError::Bus(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "An unexpected error occurred".to_string(),
            AppError::RateLimited => "Too many requests, slow down".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        ApiResponse::error(status, self.code(), &self.public_message(), self.details())
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_codes_map_to_the_public_taxonomy() {
        assert_eq!(AppError::InvalidCredentials.code(), "AUTH001");
        assert_eq!(AppError::AccountLocked.code(), "AUTH002");
        assert_eq!(AppError::IdentifierTaken.code(), "AUTH003");
        assert_eq!(AppError::InvalidRefreshToken.code(), "AUTH004");
        assert_eq!(AppError::UserNotFound.code(), "AUTH005");
        assert_eq!(AppError::TokenAccountMismatch.code(), "AUTH008");
    }

    #[test]
    fn storage_detail_is_never_exposed() {
        let err = AppError::ChatStore("quorum write failed on node 2".into());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.public_message(), "An unexpected error occurred");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn locked_response_discloses_lockout() {
        let details = AppError::AccountLocked.details().unwrap();
        assert_eq!(details["locked"], true);
        assert_eq!(
            AppError::AccountLocked.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
