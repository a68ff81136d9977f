use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// How an account was created. Closed set: no stringly-typed providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "auth_provider", rename_all = "lowercase")]
pub enum Provider {
    Credentials,
    Github,
    Google,
}

impl Provider {
    /// Human-facing label used in error messages.
    pub fn label(self) -> &'static str {
        match self {
            Provider::Credentials => "credentials",
            Provider::Github => "GitHub",
            Provider::Google => "Google",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                               // unique user ID
    pub username: String,                       // unique handle
    pub email: String,                          // unique email
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,          // Argon2 hash, absent for OAuth accounts
    pub name: Option<String>,                   // display name
    pub avatar_url: Option<String>,
    pub provider: Provider,
    pub role: Role,
    pub email_verified: Option<OffsetDateTime>, // null until verified
    pub created_at: OffsetDateTime,
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: Provider,
    pub role: Role,
}

/// Session record. Only the refresh token *hash* is ever stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_token: String,                  // opaque access identifier
    pub expires: OffsetDateTime,                // access expiry
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,             // Argon2 hash of the refresh secret
    pub refresh_token_expires: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

/// Fields required to insert a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub session_token: String,
    pub expires: OffsetDateTime,
    pub refresh_token_hash: String,
    pub refresh_token_expires: OffsetDateTime,
}

/// Replacement fields written by one refresh-token rotation.
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub session_token: String,
    pub expires: OffsetDateTime,
    pub refresh_token_hash: String,
    pub refresh_token_expires: OffsetDateTime,
}

/// Single-use email verification token.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VerificationToken {
    pub token: String,
    pub identifier: String,                     // email the token was issued for
    pub expires: OffsetDateTime,
}
