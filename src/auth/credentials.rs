use tracing::warn;

use crate::{
    auth::{password::verify_password, repo_types::{Provider, User}},
    error::AuthError,
    store::{AuthStore, UserStore},
};

/// Check an email/password pair against the stored account.
///
/// Callers receive the full row and are expected to project it through
/// `PublicUser` before it leaves the process; the hash itself is marked
/// skip-serialize as a second line of defense.
pub async fn verify_credentials(
    store: &dyn AuthStore,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    let Some(user) = store.find_user_by_email(email).await? else {
        warn!(email = %email, "sign-in for unknown email");
        return Err(AuthError::UnknownAccount);
    };

    if user.provider != Provider::Credentials {
        warn!(user_id = %user.id, provider = ?user.provider, "sign-in against OAuth account");
        return Err(AuthError::WrongProvider(user.provider));
    }

    let Some(hash) = user.password_hash.as_deref() else {
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(password, hash)? {
        warn!(user_id = %user.id, "sign-in with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    if user.email_verified.is_none() {
        return Err(AuthError::EmailNotVerified);
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::auth::repo_types::{NewUser, Role};
    use crate::store::{MemoryStore, UserStore, VerificationTokenStore};
    use crate::auth::verification;

    async fn seed_user(store: &MemoryStore, provider: Provider, password: Option<&str>) {
        store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@x.com".into(),
                password_hash: password.map(|p| hash_password(p).unwrap()),
                name: Some("Alice".into()),
                avatar_url: None,
                provider,
                role: Role::User,
            })
            .await
            .unwrap();
    }

    async fn verify_email(store: &MemoryStore) {
        let token = verification::issue(store, "alice@x.com").await.unwrap();
        store.consume_verification_token(&token).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_email_fails_like_a_wrong_password() {
        let store = MemoryStore::new();
        let err = verify_credentials(&store, "nobody@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownAccount));
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn oauth_accounts_cannot_sign_in_with_a_password() {
        let store = MemoryStore::new();
        seed_user(&store, Provider::Github, None).await;
        let err = verify_credentials(&store, "alice@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::WrongProvider(Provider::Github)));
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let store = MemoryStore::new();
        seed_user(&store, Provider::Credentials, Some("password123")).await;
        verify_email(&store).await;
        let err = verify_credentials(&store, "alice@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unverified_email_fails_even_with_correct_password() {
        let store = MemoryStore::new();
        seed_user(&store, Provider::Credentials, Some("password123")).await;
        let err = verify_credentials(&store, "alice@x.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));
    }

    #[tokio::test]
    async fn verified_user_with_correct_password_succeeds() {
        let store = MemoryStore::new();
        seed_user(&store, Provider::Credentials, Some("password123")).await;
        verify_email(&store).await;
        let user = verify_credentials(&store, "alice@x.com", "password123")
            .await
            .unwrap();
        assert_eq!(user.email, "alice@x.com");
    }
}
