//! Route definitions for the `/auth` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST   /register                   -> register
/// GET    /verify/{token}             -> verify_email
/// POST   /login                      -> login
/// POST   /refresh                    -> refresh
/// POST   /logout                     -> logout
/// GET    /sessions                   -> list_sessions (requires auth)
/// POST   /logout-all-other-devices   -> logout_all_other_devices (requires auth)
/// DELETE /sessions/{id}              -> terminate_session (requires auth)
/// GET    /profile                    -> profile (requires auth)
/// GET    /admin                      -> admin (requires admin capability)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/verify/{token}", get(auth::verify_email))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/sessions", get(auth::list_sessions))
        .route(
            "/logout-all-other-devices",
            post(auth::logout_all_other_devices),
        )
        .route("/sessions/{id}", delete(auth::terminate_session))
        .route("/profile", get(auth::profile))
        .route("/admin", get(auth::admin))
}
