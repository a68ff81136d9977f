use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        credentials::verify_credentials,
        dto::{
            AuthResponse, MessageResponse, PublicUser, RefreshRequest, RefreshResponse,
            RegisterRequest, RegisterResponse, SignInRequest, VerifyEmailQuery,
        },
        extractors::AuthSession,
        password::hash_password,
        providers::{resolve_oauth_user, OAuthIdentity},
        repo_types::{NewUser, Provider, Role, User},
        session::SessionManager,
        verification,
    },
    email::build_verify_url,
    error::AuthError,
    state::AppState,
    store::UserStore,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/verify-email", get(verify_email))
        .route("/me", get(get_me))
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/oauth", post(oauth_sign_in))
        .route("/auth/refresh", post(refresh))
        .route("/auth/sign-out", post(sign_out))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Issue a verification token for the address and hand the link to the email
/// sink. Delivery problems are logged and do not fail the enclosing request.
async fn send_verification_email(state: &AppState, email: &str) -> Result<(), AuthError> {
    let token = verification::issue(&*state.store, email).await?;
    let url = build_verify_url(&state.config.email.base_url, &token);
    if let Err(e) = state.mailer.send_verification(email, &url).await {
        warn!(error = %e, email = %email, "verification email send failed");
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    payload.email = normalize_email(&payload.email);
    payload.username = payload.username.trim().to_string();

    if payload.username.is_empty() || payload.username.len() > 30 {
        return Err(AuthError::Validation(
            "Username must be between 1 and 30 characters".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(AuthError::Validation(
            "Password must have at least 8 characters".into(),
        ));
    }

    // Ensure email and username are not taken
    if state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .is_some()
    {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::Conflict("Email already in use".into()));
    }
    if state
        .store
        .find_user_by_username(&payload.username)
        .await?
        .is_some()
    {
        return Err(AuthError::Conflict("Username already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: payload.username,
            email: payload.email.clone(),
            password_hash: Some(hash),
            name: None,
            avatar_url: None,
            provider: Provider::Credentials,
            role: Role::User,
        })
        .await?;

    send_verification_email(&state, &user.email).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(user),
            message:
                "User created successfully. Please check your email to verify your account."
                    .into(),
        }),
    ))
}

#[instrument(skip(state, query))]
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<MessageResponse>, AuthError> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Validation("Verification token is required".into()))?;

    let email = verification::consume(&*state.store, token).await?;
    info!(email = %email, "email verified");
    Ok(Json(MessageResponse {
        message: "Email verified successfully.".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(mut payload): Json<SignInRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    payload.email = normalize_email(&payload.email);
    if !is_valid_email(&payload.email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }

    let user = verify_credentials(&*state.store, &payload.email, &payload.password).await?;
    let response = issue_for(&state, user).await?;
    info!(email = %response.user.email, "user signed in");
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn oauth_sign_in(
    State(state): State<AppState>,
    Json(mut payload): Json<OAuthIdentity>,
) -> Result<Json<AuthResponse>, AuthError> {
    payload.email = normalize_email(&payload.email);
    if !is_valid_email(&payload.email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }

    let (user, created) = resolve_oauth_user(&*state.store, &payload).await?;
    if created {
        // First login doubles as registration, verification email included.
        send_verification_email(&state, &user.email).await?;
    }
    let response = issue_for(&state, user).await?;
    info!(email = %response.user.email, provider = ?payload.provider, "oauth sign-in");
    Ok(Json(response))
}

async fn issue_for(state: &AppState, user: User) -> Result<AuthResponse, AuthError> {
    let manager = SessionManager::from_ref(state);
    let issued = manager.issue(user.id).await?;
    Ok(AuthResponse {
        session_token: issued.session_token,
        refresh_token: issued.refresh_token,
        expires: issued.expires,
        user: PublicUser::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AuthError> {
    let presented = payload
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::Validation("No refresh token provided".into()))?;

    let manager = SessionManager::from_ref(&state);
    let issued = manager.refresh(presented).await?;
    Ok(Json(RefreshResponse {
        session_token: issued.session_token,
        refresh_token: issued.refresh_token,
        expires: issued.expires,
        message: "Token refreshed successfully".into(),
    }))
}

#[instrument(skip(state, session))]
pub async fn sign_out(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Result<StatusCode, AuthError> {
    let manager = SessionManager::from_ref(&state);
    manager.revoke_user(session.user_id).await?;
    info!(user_id = %session.user_id, "user signed out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, session))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
) -> Result<Json<PublicUser>, AuthError> {
    let user = state
        .store
        .find_user_by_id(session.user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(PublicUser::from(user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailSender;
    use crate::state::AppState;
    use axum::async_trait;
    use std::sync::{Arc, Mutex};
    use time::{Duration, OffsetDateTime};

    /// Captures outbound verification links so tests can walk the full flow.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send_verification(&self, to: &str, url: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((to.into(), url.into()));
            Ok(())
        }
    }

    fn test_state() -> (AppState, Arc<RecordingSender>) {
        let mailer = Arc::new(RecordingSender::default());
        let state = AppState::fake_with_mailer(mailer.clone());
        (state, mailer)
    }

    fn register_payload(username: &str, email: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        })
    }

    fn token_from(url: &str) -> String {
        url.split("token=").nth(1).expect("token in url").to_string()
    }

    #[tokio::test]
    async fn register_validates_input() {
        let (state, _) = test_state();

        let err = register(State(state.clone()), register_payload("", "a@x.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = register(State(state.clone()), register_payload("alice", "not-an-email", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));

        let err = register(State(state), register_payload("alice", "a@x.com", "short"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn register_creates_user_and_emails_exactly_one_token() {
        let (state, mailer) = test_state();
        let (status, Json(body)) = register(
            State(state.clone()),
            register_payload("alice", "Alice@X.com", "password123"),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.user.email, "alice@x.com"); // normalized
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("password_hash"));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice@x.com");
        assert!(sent[0].1.contains("/verify-email?token="));
    }

    #[tokio::test]
    async fn register_conflicts_on_duplicate_email_and_username() {
        let (state, _) = test_state();
        register(State(state.clone()), register_payload("alice", "a@x.com", "password123"))
            .await
            .unwrap();

        let err = register(State(state.clone()), register_payload("bob", "a@x.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));

        let err = register(State(state), register_payload("alice", "b@x.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn sign_in_requires_a_verified_email() {
        let (state, _) = test_state();
        register(State(state.clone()), register_payload("alice", "a@x.com", "password123"))
            .await
            .unwrap();

        let err = sign_in(
            State(state),
            Json(SignInRequest {
                email: "a@x.com".into(),
                password: "password123".into(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::EmailNotVerified));
    }

    #[tokio::test]
    async fn register_verify_sign_in_round_trip() {
        let (state, mailer) = test_state();
        register(
            State(state.clone()),
            register_payload("alice", "alice@x.com", "password123"),
        )
        .await
        .unwrap();

        let token = token_from(&mailer.sent.lock().unwrap()[0].1);
        let Json(verified) = verify_email(
            State(state.clone()),
            Query(VerifyEmailQuery { token: Some(token.clone()) }),
        )
        .await
        .unwrap();
        assert_eq!(verified.message, "Email verified successfully.");

        // Second consumption of the same link is a dead end.
        let err = verify_email(
            State(state.clone()),
            Query(VerifyEmailQuery { token: Some(token) }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::TokenNotFound));

        let Json(auth) = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                email: "alice@x.com".into(),
                password: "password123".into(),
            }),
        )
        .await
        .unwrap();

        // Fresh session expires roughly one access TTL from now.
        let until = auth.expires - OffsetDateTime::now_utc();
        let access_ttl = state.config.token.access_ttl();
        assert!(until > access_ttl - Duration::minutes(1));
        assert!(until <= access_ttl + Duration::minutes(1));

        // The pair refreshes, and the superseded refresh token dies with it.
        let Json(rotated) = refresh(
            State(state.clone()),
            Json(RefreshRequest {
                refresh_token: Some(auth.refresh_token.clone()),
            }),
        )
        .await
        .unwrap();
        assert_ne!(rotated.refresh_token, auth.refresh_token);

        let err = refresh(
            State(state),
            Json(RefreshRequest {
                refresh_token: Some(auth.refresh_token),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn verify_email_requires_a_token() {
        let (state, _) = test_state();
        let err = verify_email(State(state), Query(VerifyEmailQuery { token: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn refresh_requires_a_token() {
        let (state, _) = test_state();
        let err = refresh(State(state), Json(RefreshRequest { refresh_token: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn oauth_first_login_creates_account_and_sends_verification() {
        let (state, mailer) = test_state();
        let Json(auth) = oauth_sign_in(
            State(state.clone()),
            Json(OAuthIdentity {
                provider: Provider::Github,
                email: "Alice@X.com".into(),
                name: Some("Alice".into()),
                avatar_url: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(auth.user.username, "alice");
        assert_eq!(auth.user.provider, Provider::Github);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);

        // Second login reuses the account and sends nothing new.
        let Json(again) = oauth_sign_in(
            State(state),
            Json(OAuthIdentity {
                provider: Provider::Github,
                email: "alice@x.com".into(),
                name: Some("Alice".into()),
                avatar_url: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(again.user.id, auth.user.id);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sign_out_revokes_every_session() {
        let (state, mailer) = test_state();
        register(
            State(state.clone()),
            register_payload("alice", "alice@x.com", "password123"),
        )
        .await
        .unwrap();
        let token = token_from(&mailer.sent.lock().unwrap()[0].1);
        verify_email(
            State(state.clone()),
            Query(VerifyEmailQuery { token: Some(token) }),
        )
        .await
        .unwrap();

        let Json(first) = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                email: "alice@x.com".into(),
                password: "password123".into(),
            }),
        )
        .await
        .unwrap();
        let Json(second) = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                email: "alice@x.com".into(),
                password: "password123".into(),
            }),
        )
        .await
        .unwrap();

        let manager = SessionManager::from_ref(&state);
        let session = manager.validate(&second.session_token).await.unwrap();
        let status = sign_out(State(state.clone()), AuthSession(session)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        // Both devices are signed out.
        assert!(manager.validate(&first.session_token).await.is_err());
        assert!(manager.validate(&second.session_token).await.is_err());
    }

    #[tokio::test]
    async fn me_returns_the_sanitized_user() {
        let (state, mailer) = test_state();
        register(
            State(state.clone()),
            register_payload("alice", "alice@x.com", "password123"),
        )
        .await
        .unwrap();
        let token = token_from(&mailer.sent.lock().unwrap()[0].1);
        verify_email(
            State(state.clone()),
            Query(VerifyEmailQuery { token: Some(token) }),
        )
        .await
        .unwrap();
        let Json(auth) = sign_in(
            State(state.clone()),
            Json(SignInRequest {
                email: "alice@x.com".into(),
                password: "password123".into(),
            }),
        )
        .await
        .unwrap();

        let manager = SessionManager::from_ref(&state);
        let session = manager.validate(&auth.session_token).await.unwrap();
        let Json(user) = get_me(State(state), AuthSession(session)).await.unwrap();
        assert_eq!(user.email, "alice@x.com");
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
    }
}
