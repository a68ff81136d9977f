use std::sync::Arc;

use axum::extract::FromRef;
use rand::{rngs::OsRng, RngCore};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::{
        password::{hash_password, verify_password},
        repo_types::{NewSession, RotatedSession, Session},
    },
    error::AuthError,
    state::AppState,
    store::{AuthStore, SessionStore},
};

/// Issues, validates, rotates and revokes session/refresh token pairs.
///
/// The client-facing refresh token is `"<session_token>.<secret>"`: the first
/// part locates the session row, the second is verified against the stored
/// hash. Only the hash ever reaches the store, and the composite is returned
/// to the caller exactly once per issuance or rotation.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn AuthStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// One-time token pair handed back after issue or refresh.
#[derive(Debug)]
pub struct IssuedTokens {
    pub user_id: Uuid,
    pub session_token: String,
    pub refresh_token: String,
    pub expires: OffsetDateTime,
    pub refresh_expires: OffsetDateTime,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.store.clone(),
            state.config.token.access_ttl(),
            state.config.token.refresh_ttl(),
        )
    }
}

/// 32 random bytes, hex-encoded: 256 bits of entropy per refresh secret.
fn generate_refresh_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Split a presented composite refresh token into (session token, secret).
fn split_refresh_token(presented: &str) -> Option<(&str, &str)> {
    match presented.split_once('.') {
        Some((token, secret)) if !token.is_empty() && !secret.is_empty() => Some((token, secret)),
        _ => None,
    }
}

impl SessionManager {
    pub fn new(store: Arc<dyn AuthStore>, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        debug_assert!(access_ttl <= refresh_ttl);
        Self {
            store,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Create a session for a freshly authenticated user. Multiple live
    /// sessions per user are allowed (one per device).
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedTokens, AuthError> {
        let now = OffsetDateTime::now_utc();
        let session_token = Uuid::new_v4().to_string();
        let secret = generate_refresh_secret();

        let session = self
            .store
            .create_session(NewSession {
                user_id,
                session_token: session_token.clone(),
                expires: now + self.access_ttl,
                refresh_token_hash: hash_password(&secret)?,
                refresh_token_expires: now + self.refresh_ttl,
            })
            .await?;

        debug!(user_id = %user_id, session_id = %session.id, "session issued");
        Ok(IssuedTokens {
            user_id,
            refresh_token: format!("{session_token}.{secret}"),
            session_token,
            expires: session.expires,
            refresh_expires: session.refresh_token_expires,
        })
    }

    /// Resolve a session token presented on a request. Read-only while the
    /// access window is open; a session whose refresh window has closed is
    /// removed along with the user's other sessions.
    pub async fn validate(&self, session_token: &str) -> Result<Session, AuthError> {
        let session = self
            .store
            .find_session_by_token(session_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        let now = OffsetDateTime::now_utc();
        if now > session.refresh_token_expires {
            self.store.delete_sessions_by_user(session.user_id).await?;
            warn!(user_id = %session.user_id, "refresh window closed, sessions dropped");
            return Err(AuthError::SessionExpired);
        }
        if now > session.expires {
            return Err(AuthError::AccessExpired);
        }
        Ok(session)
    }

    /// Redeem a refresh token for a new pair, rotating both halves.
    ///
    /// At most one rotation succeeds per token generation: the store update
    /// is conditional on the session token the row carried when we read it,
    /// so a concurrent refresh that already rotated the row loses here.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedTokens, AuthError> {
        let (token_part, secret) =
            split_refresh_token(presented).ok_or(AuthError::RefreshTokenInvalid)?;

        let session = self
            .store
            .find_session_by_token(token_part)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        let now = OffsetDateTime::now_utc();
        if now > session.refresh_token_expires {
            self.store.delete_session(session.id).await?;
            return Err(AuthError::RefreshExpired);
        }

        if !verify_password(secret, &session.refresh_token_hash)? {
            // A wrong secret against a live session smells like a replayed or
            // stolen token: terminate the session rather than continue.
            self.store.delete_session(session.id).await?;
            warn!(user_id = %session.user_id, session_id = %session.id, "refresh token mismatch, session revoked");
            return Err(AuthError::RefreshTokenInvalid);
        }

        let new_token = Uuid::new_v4().to_string();
        let new_secret = generate_refresh_secret();
        let rotated = RotatedSession {
            session_token: new_token.clone(),
            expires: now + self.access_ttl,
            refresh_token_hash: hash_password(&new_secret)?,
            // Sliding window: every successful rotation extends the refresh
            // lifetime by a full TTL.
            refresh_token_expires: now + self.refresh_ttl,
        };

        let updated = self
            .store
            .rotate_session(session.id, &session.session_token, rotated)
            .await?
            .ok_or(AuthError::RefreshTokenInvalid)?;

        debug!(user_id = %session.user_id, session_id = %session.id, "session rotated");
        Ok(IssuedTokens {
            user_id: updated.user_id,
            refresh_token: format!("{new_token}.{new_secret}"),
            session_token: new_token,
            expires: updated.expires,
            refresh_expires: updated.refresh_token_expires,
        })
    }

    /// Drop every session the user holds. Idempotent.
    pub async fn revoke_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let dropped = self.store.delete_sessions_by_user(user_id).await?;
        debug!(user_id = %user_id, dropped = dropped, "sessions revoked");
        Ok(())
    }
}
