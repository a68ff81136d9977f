use serde::Deserialize;
use tracing::info;

use crate::{
    auth::repo_types::{NewUser, Provider, Role, User},
    error::AuthError,
    store::{AuthStore, UserStore},
};

/// Identity asserted by the upstream OAuth terminator. By the time this
/// reaches us the provider has already authenticated the user; we only map
/// it onto an account.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthIdentity {
    pub provider: Provider,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Find or create the account behind an OAuth identity.
///
/// Returns the user and whether this login created the account. A first
/// login derives a unique username from the display name; an existing
/// account created through another provider is not silently linked.
pub async fn resolve_oauth_user(
    store: &dyn AuthStore,
    identity: &OAuthIdentity,
) -> Result<(User, bool), AuthError> {
    if identity.provider == Provider::Credentials {
        return Err(AuthError::Validation("Not an OAuth provider".into()));
    }

    if let Some(existing) = store.find_user_by_email(&identity.email).await? {
        if existing.provider != identity.provider {
            return Err(AuthError::WrongProvider(existing.provider));
        }
        return Ok((existing, false));
    }

    let username = unique_username(
        store,
        &username_base(identity.name.as_deref(), &identity.email),
    )
    .await?;

    let user = store
        .create_user(NewUser {
            username: username.clone(),
            email: identity.email.clone(),
            password_hash: None,
            name: identity.name.clone(),
            avatar_url: identity.avatar_url.clone(),
            provider: identity.provider,
            role: Role::User,
        })
        .await?;

    info!(user_id = %user.id, username = %username, provider = ?identity.provider, "user created via OAuth");
    Ok((user, true))
}

const USERNAME_MAX: usize = 30;

/// Lowercased alphanumeric skeleton of a display name, falling back to the
/// email local part, then to a fixed stem.
fn username_base(name: Option<&str>, email: &str) -> String {
    let from = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .take(USERNAME_MAX)
            .collect()
    };

    if let Some(name) = name {
        let base = from(name);
        if !base.is_empty() {
            return base;
        }
    }
    let local = email.split('@').next().unwrap_or_default();
    let base = from(local);
    if base.is_empty() {
        "user".into()
    } else {
        base
    }
}

/// Resolve collisions by numeric suffix: `alice`, `alice1`, `alice2`, ...
/// The suffixed candidate is trimmed so it never exceeds the username limit.
async fn unique_username(store: &dyn AuthStore, base: &str) -> Result<String, AuthError> {
    if store.find_user_by_username(base).await?.is_none() {
        return Ok(base.to_string());
    }
    let mut n: u32 = 1;
    loop {
        let suffix = n.to_string();
        let keep = USERNAME_MAX.saturating_sub(suffix.len());
        let candidate = format!("{}{}", &base[..base.len().min(keep)], suffix);
        if store.find_user_by_username(&candidate).await?.is_none() {
            return Ok(candidate);
        }
        n += 1;
    }
}
