use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{
    NewSession, NewUser, RotatedSession, Session, User, VerificationToken,
};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Backend failures. `Unavailable` is fatal for the request and never retried
/// here; transport-level retries are the caller's business.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

#[async_trait]
pub trait UserStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait SessionStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError>;
    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError>;
    async fn find_sessions_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError>;
    /// Conditional rotation: replaces the token pair only while `current_token`
    /// is still the session's token. Returns `None` when a concurrent rotation
    /// already superseded it.
    async fn rotate_session(
        &self,
        id: Uuid,
        current_token: &str,
        rotated: RotatedSession,
    ) -> Result<Option<Session>, StoreError>;
    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError>;
    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait VerificationTokenStore {
    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<(), StoreError>;
    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError>;
    /// Deletes the token and stamps `email_verified` on its user in one atomic
    /// step. Returns the email the token was issued for, or `None` if the
    /// token was already consumed.
    async fn consume_verification_token(&self, token: &str)
        -> Result<Option<String>, StoreError>;
}

/// The single persistence boundary the auth components talk to.
pub trait AuthStore:
    UserStore + SessionStore + VerificationTokenStore + Send + Sync
{
}

impl<T> AuthStore for T where T: UserStore + SessionStore + VerificationTokenStore + Send + Sync {}
