use crate::state::AppState;
use axum::Router;

pub mod credentials;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod password;
pub mod providers;
pub mod repo_types;
pub mod session;
pub mod verification;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::user_routes())
        .merge(handlers::auth_routes())
}
