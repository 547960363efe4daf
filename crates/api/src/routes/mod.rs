pub mod auth;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/register                   create an unverified account (public)
/// /auth/verify/{token}             redeem a verification token (public)
/// /auth/login                      login (public)
/// /auth/refresh                    refresh (public)
/// /auth/logout                     logout (public, idempotent)
/// /auth/sessions                   list device sessions
/// /auth/sessions/{id}              terminate one session
/// /auth/logout-all-other-devices   terminate all but the current session
/// /auth/profile                    current user
/// /auth/admin                      admin console check
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/auth", auth::router())
}
