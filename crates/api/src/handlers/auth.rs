//! Handlers for the `/auth` resource (registration, login, refresh, logout,
//! device sessions).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use warden_core::error::CoreError;
use warden_core::identity::CredentialSource;
use warden_core::registration::Registration;
use warden_core::roles::Capability;
use warden_core::session::{self, SessionView, Termination, TokenPair};
use warden_core::store::PublicUser;
use warden_core::types::{DbId, Timestamp};

use crate::cookies::{clear_auth_cookies, read_cookie, set_auth_cookies, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::client::ClientContext;
use crate::middleware::rbac::{require_capability, RequireAdmin};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Overrides the `User-Agent` derived fingerprint.
    pub device_fingerprint: Option<String>,
    /// Overrides the header/peer derived origin address.
    pub origin_address: Option<String>,
}

/// Request body for `POST /auth/refresh`. The cookie is used when absent.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Request body for `POST /auth/logout`. Cookies and headers are used when absent.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// A credential pair as returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: Timestamp,
    pub refresh_expires_at: Timestamp,
}

impl From<&TokenPair> for TokenResponse {
    fn from(tokens: &TokenPair) -> Self {
        Self {
            access_token: tokens.access.token.clone(),
            refresh_token: tokens.refresh.token.clone(),
            access_expires_at: tokens.access.expires_at,
            refresh_expires_at: tokens.refresh.expires_at,
        }
    }
}

/// Successful login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenResponse,
    pub user: PublicUser,
}

/// Successful registration response.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
    pub message: &'static str,
}

/// Successful verification response.
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub user: PublicUser,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct TerminatedCount {
    pub terminated_count: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/register
///
/// Create an unverified account and email its verification link. Returns
/// 201 even when the email could not be sent; the message says which.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<RegisterResponse>>)> {
    if input.name.trim().is_empty() || input.email.trim().is_empty() || input.password.is_empty()
    {
        return Err(AppError::BadRequest("Please fill in all fields".into()));
    }

    let outcome = state
        .accounts
        .register(Registration {
            name: input.name,
            email: input.email,
            password: input.password,
        })
        .await?;

    let message = if outcome.email_sent {
        "User registered successfully. Please check your email to verify your account"
    } else {
        "User registered successfully, but verification email could not be sent"
    };
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: RegisterResponse {
                user: outcome.user,
                message,
            },
        }),
    ))
}

/// GET /api/v1/auth/verify/{token}
///
/// Redeem the emailed verification token.
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<DataResponse<VerifyResponse>>> {
    let user = state.accounts.verify(&token).await?;
    Ok(Json(DataResponse {
        data: VerifyResponse {
            user,
            message: "Account verified successfully, you can now login",
        },
    }))
}

/// POST /api/v1/auth/login
///
/// Authenticate with email + password. Returns both credentials and sets them
/// as cookies.
pub async fn login(
    State(state): State<AppState>,
    client: ClientContext,
    Json(input): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<DataResponse<LoginResponse>>)> {
    if input.email.trim().is_empty() || input.password.is_empty() {
        return Err(AppError::BadRequest("email and password are required".into()));
    }

    let request = session::LoginRequest {
        email: input.email.trim().to_string(),
        password: input.password,
        device_fingerprint: non_empty(input.device_fingerprint)
            .unwrap_or(client.device_fingerprint),
        origin_address: non_empty(input.origin_address).unwrap_or(client.origin_address),
    };
    let outcome = state.sessions.login(request).await?;

    let cookies = set_auth_cookies(&outcome.tokens, state.config.secure_cookies)?;
    Ok((
        cookies,
        Json(DataResponse {
            data: LoginResponse {
                tokens: TokenResponse::from(&outcome.tokens),
                user: outcome.user,
            },
        }),
    ))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a refresh credential (body or cookie) for a new pair. The old
/// refresh credential stops working immediately.
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientContext,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(HeaderMap, Json<DataResponse<TokenResponse>>)> {
    let input: RefreshRequest = optional_body(&body)?;
    let presented = non_empty(input.refresh_token)
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE).map(str::to_string))
        .ok_or_else(|| CoreError::Unauthorized("Refresh token required".into()))?;

    let outcome = state
        .sessions
        .refresh(&presented, &client.origin_address)
        .await
        .map_err(|e| match e {
            CoreError::NotFound(_) => {
                CoreError::Unauthorized("Invalid or expired refresh token".into())
            }
            other => other,
        })?;

    let cookies = set_auth_cookies(&outcome.tokens, state.config.secure_cookies)?;
    Ok((
        cookies,
        Json(DataResponse {
            data: TokenResponse::from(&outcome.tokens),
        }),
    ))
}

/// POST /api/v1/auth/logout
///
/// End the caller's session and revoke its access credential. Succeeds even
/// when nothing is presented or the session is already gone.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<(HeaderMap, Json<DataResponse<MessageResponse>>)> {
    let input: LogoutRequest = optional_body(&body)?;

    let access = non_empty(input.access_token).or_else(|| {
        CredentialSource {
            authorization: headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            cookie: read_cookie(&headers, ACCESS_COOKIE),
        }
        .access_token()
        .map(str::to_string)
    });
    let refresh = non_empty(input.refresh_token)
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE).map(str::to_string));

    state
        .sessions
        .logout(access.as_deref(), refresh.as_deref())
        .await?;

    Ok((
        clear_auth_cookies(state.config.secure_cookies)?,
        Json(DataResponse {
            data: MessageResponse {
                message: "Logged out successfully",
            },
        }),
    ))
}

/// GET /api/v1/auth/sessions
///
/// List the caller's live device sessions, marking the current one.
pub async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<Vec<SessionView>>>> {
    require_capability(&auth_user, Capability::ManageOwnSessions)?;
    let sessions = state
        .sessions
        .list_sessions(auth_user.user.id, auth_user.refresh_token.as_deref())
        .await?;
    Ok(Json(DataResponse { data: sessions }))
}

/// POST /api/v1/auth/logout-all-other-devices
///
/// Remove every session except the caller's own. Requires the caller's
/// refresh credential to identify the current session.
pub async fn logout_all_other_devices(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<TerminatedCount>>> {
    require_capability(&auth_user, Capability::ManageOwnSessions)?;
    let terminated_count = state
        .sessions
        .logout_all_other_devices(auth_user.user.id, auth_user.refresh_token.as_deref())
        .await?;
    Ok(Json(DataResponse {
        data: TerminatedCount { terminated_count },
    }))
}

/// DELETE /api/v1/auth/sessions/{id}
///
/// Terminate one of the caller's sessions. Terminating the current session
/// logs the caller out and clears the cookies.
pub async fn terminate_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(session_id): Path<DbId>,
) -> AppResult<(HeaderMap, Json<DataResponse<MessageResponse>>)> {
    require_capability(&auth_user, Capability::ManageOwnSessions)?;
    let termination = state
        .sessions
        .terminate_session(
            auth_user.user.id,
            session_id,
            Some(&auth_user.access_token),
            auth_user.refresh_token.as_deref(),
        )
        .await?;

    match termination {
        Termination::Terminated => Ok((
            HeaderMap::new(),
            Json(DataResponse {
                data: MessageResponse {
                    message: "Session terminated successfully",
                },
            }),
        )),
        Termination::LoggedOutCurrent(_) => Ok((
            clear_auth_cookies(state.config.secure_cookies)?,
            Json(DataResponse {
                data: MessageResponse {
                    message: "Logged out successfully",
                },
            }),
        )),
    }
}

/// GET /api/v1/auth/profile
pub async fn profile(auth_user: AuthUser) -> AppResult<Json<DataResponse<PublicUser>>> {
    require_capability(&auth_user, Capability::ViewProfile)?;
    Ok(Json(DataResponse {
        data: auth_user.user,
    }))
}

/// GET /api/v1/auth/admin
pub async fn admin(RequireAdmin(auth_user): RequireAdmin) -> Json<DataResponse<MessageResponse>> {
    tracing::info!(user_id = auth_user.user.id, "Admin console accessed");
    Json(DataResponse {
        data: MessageResponse {
            message: "Admin access granted",
        },
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a JSON body that may be omitted entirely.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}
