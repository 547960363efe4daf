//! Access-credential authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use warden_core::identity::CredentialSource;
use warden_core::store::PublicUser;

use crate::cookies::{read_cookie, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::AppError;
use crate::state::AppState;

/// Header alternative to the refresh cookie for non-browser clients.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Authenticated user resolved from `Authorization: Bearer <token>` or the
/// `accessToken` cookie.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user.id, role = %user.user.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: PublicUser,
    /// The access credential the request authenticated with.
    pub access_token: String,
    /// The caller's refresh credential, if presented. Identifies the current session.
    pub refresh_token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let source = CredentialSource {
            authorization: parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            cookie: read_cookie(&parts.headers, ACCESS_COOKIE),
        };
        let identity = state.identity.resolve(source).await?;

        let refresh_token = read_cookie(&parts.headers, REFRESH_COOKIE)
            .or_else(|| {
                parts
                    .headers
                    .get(REFRESH_TOKEN_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
            })
            .map(str::to_string);

        Ok(AuthUser {
            user: identity.user,
            access_token: identity.access_token,
            refresh_token,
        })
    }
}
