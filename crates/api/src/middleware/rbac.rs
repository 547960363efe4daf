//! Capability-based access control extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects requests whose role does not
//! hold the required [`Capability`].

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use warden_core::error::CoreError;
use warden_core::roles::Capability;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Reject with 403 unless `user`'s role holds `capability`.
pub fn require_capability(user: &AuthUser, capability: Capability) -> Result<(), AppError> {
    if user.user.role.can(capability) {
        Ok(())
    } else {
        Err(AppError::Core(CoreError::Forbidden(format!(
            "Role '{}' is not permitted to perform this action",
            user.user.role
        ))))
    }
}

/// Requires the admin console capability. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(user): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_capability(&user, Capability::AdminConsole)?;
        Ok(RequireAdmin(user))
    }
}
