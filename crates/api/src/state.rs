use std::sync::Arc;

use warden_core::identity::IdentityVerifier;
use warden_core::registration::AccountService;
use warden_core::session::SessionManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool; `None` when running on in-memory stores.
    pub pool: Option<warden_db::DbPool>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Session lifecycle manager (login, refresh, logout, device management).
    pub sessions: Arc<SessionManager>,
    /// Resolves the caller behind an access credential.
    pub identity: Arc<IdentityVerifier>,
    /// Registration and email verification.
    pub accounts: Arc<AccountService>,
}
