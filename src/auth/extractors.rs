use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    auth::{repo_types::Session, session::SessionManager},
    error::AuthError,
    state::AppState,
};

/// Extracts the bearer session token and resolves it to a live session.
/// Rejects once the access window has closed; the client is expected to
/// refresh and retry.
pub struct AuthSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AuthError::Validation("Missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| AuthError::Validation("Invalid Authorization header".into()))?;

        let manager = SessionManager::from_ref(state);
        let session = manager.validate(token).await?;
        Ok(AuthSession(session))
    }
}
