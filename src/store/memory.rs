use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{
    NewSession, NewUser, RotatedSession, Session, User, VerificationToken,
};
use crate::store::{SessionStore, StoreError, UserStore, VerificationTokenStore};

/// In-process store used by tests and local development. Uniqueness and
/// conditional rotation mirror the Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    tokens: HashMap<String, VerificationToken>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate("email"));
        }
        if inner.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::Duplicate("username"));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            avatar_url: new.avatar_url,
            provider: new.provider,
            role: new.role,
            email_verified: None,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .sessions
            .values()
            .any(|s| s.session_token == new.session_token)
        {
            return Err(StoreError::Duplicate("session token"));
        }
        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            session_token: new.session_token,
            expires: new.expires,
            refresh_token_hash: new.refresh_token_hash,
            refresh_token_expires: new.refresh_token_expires,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .values()
            .find(|s| s.session_token == token)
            .cloned())
    }

    async fn find_sessions_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        current_token: &str,
        rotated: RotatedSession,
    ) -> Result<Option<Session>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.get_mut(&id) else {
            return Ok(None);
        };
        // Compare-and-swap on the current token, as the SQL variant does.
        if session.session_token != current_token {
            return Ok(None);
        }
        session.session_token = rotated.session_token;
        session.expires = rotated.expires;
        session.refresh_token_hash = rotated.refresh_token_hash;
        session.refresh_token_expires = rotated.refresh_token_expires;
        Ok(Some(session.clone()))
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.lock().unwrap().sessions.remove(&id);
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, s| s.user_id != user_id);
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl VerificationTokenStore for MemoryStore {
    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.tokens.contains_key(&token.token) {
            return Err(StoreError::Duplicate("record"));
        }
        inner.tokens.insert(token.token.clone(), token);
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        Ok(self.inner.lock().unwrap().tokens.get(token).cloned())
    }

    async fn consume_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(record) = inner.tokens.remove(token) else {
            return Ok(None);
        };
        let verified_at = OffsetDateTime::now_utc();
        if let Some(user) = inner
            .users
            .values_mut()
            .find(|u| u.email == record.identifier)
        {
            user.email_verified = Some(verified_at);
        }
        Ok(Some(record.identifier))
    }
}
