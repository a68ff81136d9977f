use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::repo_types::Provider;
use crate::store::StoreError;

/// Everything the auth surface can fail with. Unknown account and a wrong
/// password render as the same undifferentiated message; provider mismatch
/// and an unverified email keep their own wording.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid credentials")]
    UnknownAccount,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Use {} to sign in", .0.label())]
    WrongProvider(Provider),
    #[error("Please verify your email before signing in")]
    EmailNotVerified,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid refresh token")]
    SessionNotFound,
    #[error("Access token expired")]
    AccessExpired,
    #[error("Session expired. Please sign in again")]
    SessionExpired,
    #[error("Invalid refresh token")]
    RefreshTokenInvalid,
    #[error("Refresh token expired")]
    RefreshExpired,
    #[error("Invalid or expired token")]
    TokenNotFound,
    #[error("Invalid or expired token")]
    TokenExpired,
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // A uniqueness race that slipped past the pre-checks is still a
            // conflict, not a server fault.
            StoreError::Duplicate(_) => AuthError::Conflict("Duplicate field error".into()),
            other => AuthError::Store(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::TokenNotFound | AuthError::TokenExpired => {
                StatusCode::BAD_REQUEST
            }
            AuthError::Conflict(_) => StatusCode::CONFLICT,
            AuthError::UnknownAccount
            | AuthError::UserNotFound
            | AuthError::InvalidCredentials
            | AuthError::WrongProvider(_)
            | AuthError::EmailNotVerified
            | AuthError::SessionNotFound
            | AuthError::AccessExpired
            | AuthError::SessionExpired
            | AuthError::RefreshTokenInvalid => StatusCode::UNAUTHORIZED,
            AuthError::RefreshExpired => StatusCode::FORBIDDEN,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
            "Something went wrong".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_account_and_bad_password_share_a_message() {
        assert_eq!(
            AuthError::UnknownAccount.to_string(),
            AuthError::InvalidCredentials.to_string()
        );
    }

    #[test]
    fn wrong_provider_names_the_provider() {
        let msg = AuthError::WrongProvider(Provider::Github).to_string();
        assert_eq!(msg, "Use GitHub to sign in");
    }

    #[test]
    fn statuses_follow_the_api_contract() {
        assert_eq!(
            AuthError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AuthError::SessionNotFound.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::RefreshExpired.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::TokenExpired.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_store_errors_become_conflicts() {
        let err: AuthError = StoreError::Duplicate("email").into();
        assert!(matches!(err, AuthError::Conflict(_)));
    }
}
