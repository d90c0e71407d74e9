use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::auth::dto::Envelope;

/// Every failure an account operation can surface to a client.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("User already exists with this email.")]
    DuplicateEmail,
    #[error("You are not registered.")]
    NotRegistered,
    #[error("User not found. Please register first.")]
    UnknownEmail,
    #[error("You are not a registered user.")]
    NotFound,
    #[error("Invalid credentials. Please try again.")]
    InvalidCredentials,
    #[error("Check your email and verify your account.")]
    Unverified,
    #[error("Invalid or expired verification token.")]
    InvalidToken,
    #[error("Invalid or expired password reset token.")]
    InvalidOrExpiredToken,
    #[error("{0}")]
    Unauthenticated(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::Validation(_)
            | AccountError::NotRegistered
            | AccountError::UnknownEmail
            | AccountError::InvalidToken
            | AccountError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AccountError::DuplicateEmail => StatusCode::CONFLICT,
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::InvalidCredentials
            | AccountError::Unverified
            | AccountError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AccountError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(Envelope::<()>::failure(message))).into_response()
    }
}
