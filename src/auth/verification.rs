use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::repo_types::VerificationToken,
    error::AuthError,
    store::{AuthStore, VerificationTokenStore},
};

/// Verification links die after one hour.
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(1);

/// Mint a single-use verification token for an email address. The plaintext
/// token goes into the email link and nowhere else.
pub async fn issue(store: &dyn AuthStore, email: &str) -> Result<String, AuthError> {
    let token = Uuid::new_v4().to_string();
    store
        .create_verification_token(VerificationToken {
            token: token.clone(),
            identifier: email.to_string(),
            expires: OffsetDateTime::now_utc() + VERIFICATION_TOKEN_TTL,
        })
        .await?;
    debug!(email = %email, "verification token issued");
    Ok(token)
}

/// Redeem a verification token, marking its user verified and deleting it.
///
/// An expired token fails without touching the store beyond the lookup; a
/// consumed or unknown token fails `TokenNotFound`.
pub async fn consume(store: &dyn AuthStore, token: &str) -> Result<String, AuthError> {
    let record = store
        .find_verification_token(token)
        .await?
        .ok_or(AuthError::TokenNotFound)?;

    if OffsetDateTime::now_utc() > record.expires {
        return Err(AuthError::TokenExpired);
    }

    // The consume is atomic in the store; losing a race here reads as the
    // token never having existed.
    match store.consume_verification_token(token).await? {
        Some(email) => {
            debug!(email = %email, "email verified");
            Ok(email)
        }
        None => Err(AuthError::TokenNotFound),
    }
}
