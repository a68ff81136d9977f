use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::repo_types::{
    NewSession, NewUser, RotatedSession, Session, User, VerificationToken,
};
use crate::store::{SessionStore, StoreError, UserStore, VerificationTokenStore};

/// Postgres-backed store. Rotation and token consumption are expressed as
/// conditional writes so concurrent requests cannot both succeed.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation to the offending field; anything else is a backend
/// failure surfaced as `Unavailable`.
fn map_db_error(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            let field = match db.constraint() {
                Some(c) if c.contains("email") => "email",
                Some(c) if c.contains("username") => "username",
                Some(c) if c.contains("session_token") => "session token",
                _ => "record",
            };
            return StoreError::Duplicate(field);
        }
    }
    StoreError::Unavailable(err.into())
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, name, avatar_url, provider, role, email_verified, created_at";

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (username, email, password_hash, name, avatar_url, provider, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.name)
            .bind(&new.avatar_url)
            .bind(new.provider)
            .bind(new.role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }
}

const SESSION_COLUMNS: &str =
    "id, user_id, session_token, expires, refresh_token_hash, refresh_token_expires, created_at";

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let query = format!(
            r#"
            INSERT INTO sessions (user_id, session_token, expires, refresh_token_hash, refresh_token_expires)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(new.user_id)
            .bind(&new.session_token)
            .bind(new.expires)
            .bind(&new.refresh_token_hash)
            .bind(new.refresh_token_expires)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_token = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn find_sessions_by_user(&self, user_id: Uuid) -> Result<Vec<Session>, StoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn rotate_session(
        &self,
        id: Uuid,
        current_token: &str,
        rotated: RotatedSession,
    ) -> Result<Option<Session>, StoreError> {
        // The WHERE clause on the old token is the atomicity guarantee: a
        // concurrent refresh that already rotated this row matches zero rows.
        let query = format!(
            r#"
            UPDATE sessions
            SET session_token = $3,
                expires = $4,
                refresh_token_hash = $5,
                refresh_token_expires = $6
            WHERE id = $1 AND session_token = $2
            RETURNING {SESSION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(current_token)
            .bind(&rotated.session_token)
            .bind(rotated.expires)
            .bind(&rotated.refresh_token_hash)
            .bind(rotated.refresh_token_expires)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn delete_session(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VerificationTokenStore for PgStore {
    async fn create_verification_token(
        &self,
        token: VerificationToken,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (token, identifier, expires)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&token.token)
        .bind(&token.identifier)
        .bind(token.expires)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        sqlx::query_as::<_, VerificationToken>(
            "SELECT token, identifier, expires FROM verification_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn consume_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<String>, StoreError> {
        // Delete-and-mark in one transaction; the DELETE..RETURNING makes a
        // second concurrent consumption observe a missing token.
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        let identifier: Option<(String,)> =
            sqlx::query_as("DELETE FROM verification_tokens WHERE token = $1 RETURNING identifier")
                .bind(token)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_db_error)?;

        let Some((email,)) = identifier else {
            tx.rollback().await.map_err(map_db_error)?;
            return Ok(None);
        };

        sqlx::query("UPDATE users SET email_verified = now() WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(Some(email))
    }
}
