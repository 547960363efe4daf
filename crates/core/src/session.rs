//! Session lifecycle: login, refresh, logout, and device management.
//!
//! Per (user, device) a session moves `absent -> active -> (rotated)* -> absent`.
//! [`SessionManager`] is the only writer of session records and revocation
//! entries. Every store round trip is bounded by
//! [`SessionConfig::store_timeout`].

use std::sync::Arc;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::credential::{credential_digest, CredentialCodec, CredentialKind, IssuedCredential};
use crate::error::CoreError;
use crate::ledger::{Revocation, RevocationLedger};
use crate::password::{verify_password, DUMMY_HASH};
use crate::registration::normalize_email;
use crate::store::{
    bounded, NewSession, PublicUser, Rotation, SessionStore, UpsertOutcome, UserDirectory,
};
use crate::types::{DbId, Timestamp};

/// Input for [`SessionManager::login`].
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub device_fingerprint: String,
    pub origin_address: String,
}

/// An access + refresh credential pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedCredential,
    pub refresh: IssuedCredential,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: PublicUser,
    pub session_id: DbId,
    /// Sessions evicted to stay within the device cap.
    pub evicted: Vec<DbId>,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub tokens: TokenPair,
    pub session_id: DbId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub session_removed: bool,
    pub access_revoked: bool,
}

/// Outcome of [`SessionManager::terminate_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Another device's session was removed.
    Terminated,
    /// The caller's own session was targeted and logged out.
    LoggedOutCurrent(LogoutOutcome),
}

/// A session as shown to its owner.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionView {
    pub id: DbId,
    pub device_fingerprint: String,
    pub origin_address: String,
    pub issued_at: Timestamp,
    pub last_used_at: Timestamp,
    pub is_current: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub revocations: u64,
}

pub struct SessionManager {
    config: Arc<SessionConfig>,
    codec: Arc<CredentialCodec>,
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<RevocationLedger>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

/// Treat empty strings the same as an absent credential.
fn present(token: Option<&str>) -> Option<&str> {
    token.map(str::trim).filter(|t| !t.is_empty())
}

impl SessionManager {
    pub fn new(
        config: Arc<SessionConfig>,
        codec: Arc<CredentialCodec>,
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<RevocationLedger>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            codec,
            sessions,
            ledger,
            users,
            clock,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Authenticate with email + password and open (or rotate) the device session.
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, CoreError> {
        let timeout = self.config.store_timeout;

        let email = normalize_email(&request.email);
        let Some(user) = bounded(timeout, self.users.find_by_email(&email)).await? else {
            self.password_matches(request.password, DUMMY_HASH.to_string())
                .await?;
            tracing::info!("Login rejected: unknown email");
            return Err(CoreError::InvalidCredentials);
        };

        if !self
            .password_matches(request.password, user.password_hash.clone())
            .await?
        {
            tracing::info!(user_id = user.id, "Login rejected: wrong password");
            return Err(CoreError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(CoreError::NotVerified);
        }

        let now = self.clock.now();
        let tokens = self.issue_pair(user.id, now)?;

        let new_session = NewSession {
            user_id: user.id,
            refresh_token_hash: credential_digest(&tokens.refresh.token),
            device_fingerprint: request.device_fingerprint,
            origin_address: request.origin_address,
            issued_at: now,
            expires_at: tokens.refresh.expires_at,
        };
        let outcome = bounded(
            timeout,
            self.sessions.upsert(new_session, self.config.device_cap),
        )
        .await?;

        let session_id = outcome.record().id;
        let evicted = match outcome {
            UpsertOutcome::Updated(_) => {
                tracing::info!(user_id = user.id, session_id, "Login refreshed existing device session");
                Vec::new()
            }
            UpsertOutcome::Inserted { evicted, .. } => {
                if !evicted.is_empty() {
                    tracing::info!(
                        user_id = user.id,
                        evicted = ?evicted,
                        device_cap = self.config.device_cap,
                        "Evicted least recently used sessions"
                    );
                }
                tracing::info!(user_id = user.id, session_id, "Login created new device session");
                evicted
            }
        };

        Ok(LoginOutcome {
            tokens,
            user: PublicUser::from(&user),
            session_id,
            evicted,
        })
    }

    /// Exchange a refresh credential for a new pair, rotating the session.
    pub async fn refresh(
        &self,
        presented: &str,
        origin_address: &str,
    ) -> Result<RefreshOutcome, CoreError> {
        let timeout = self.config.store_timeout;
        let presented_hash = credential_digest(presented);

        let record = bounded(timeout, self.sessions.find_by_credential(&presented_hash))
            .await?
            .ok_or(CoreError::NotFound("Session"))?;

        let now = self.clock.now();
        if record.is_expired(now) {
            self.discard(record.id, "expired refresh token").await;
            return Err(CoreError::Expired);
        }

        if bounded(timeout, self.users.find_by_id(record.user_id))
            .await?
            .is_none()
        {
            self.discard(record.id, "user no longer exists").await;
            return Err(CoreError::NotFound("User"));
        }

        let tokens = self.issue_pair(record.user_id, now)?;
        let rotation = Rotation {
            refresh_token_hash: credential_digest(&tokens.refresh.token),
            origin_address: origin_address.to_string(),
            last_used_at: now,
            expires_at: tokens.refresh.expires_at,
        };

        let rotated = bounded(
            timeout,
            self.sessions.rotate(record.id, &presented_hash, rotation),
        )
        .await?;
        if !rotated {
            tracing::warn!(
                user_id = record.user_id,
                session_id = record.id,
                "Refresh lost a concurrent rotation"
            );
            return Err(CoreError::NotFound("Session"));
        }

        tracing::debug!(user_id = record.user_id, session_id = record.id, "Session rotated");
        Ok(RefreshOutcome {
            tokens,
            session_id: record.id,
        })
    }

    /// Delete the session and revoke the access credential. Idempotent.
    ///
    /// Both steps are attempted even if the first fails; the first error is
    /// returned afterwards.
    pub async fn logout(
        &self,
        access: Option<&str>,
        refresh: Option<&str>,
    ) -> Result<LogoutOutcome, CoreError> {
        let mut outcome = LogoutOutcome::default();
        let mut first_error = None;

        if let Some(refresh) = present(refresh) {
            match bounded(
                self.config.store_timeout,
                self.sessions.delete_by_credential(&credential_digest(refresh)),
            )
            .await
            {
                Ok(removed) => outcome.session_removed = removed,
                Err(e) => first_error = Some(e),
            }
        }

        if let Some(access) = present(access) {
            match self.ledger.revoke(access, self.clock.now()).await {
                Ok(Revocation::Recorded) => outcome.access_revoked = true,
                Ok(Revocation::AlreadyExpired | Revocation::Unverifiable) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                tracing::warn!(error = %e, "Logout could not complete");
                Err(e)
            }
            None => {
                tracing::info!(
                    session_removed = outcome.session_removed,
                    access_revoked = outcome.access_revoked,
                    "Logout"
                );
                Ok(outcome)
            }
        }
    }

    /// Remove every session of `user_id` except the caller's own.
    pub async fn logout_all_other_devices(
        &self,
        user_id: DbId,
        current_refresh: Option<&str>,
    ) -> Result<u64, CoreError> {
        let current = present(current_refresh).ok_or(CoreError::MissingCurrentSession)?;
        let removed = bounded(
            self.config.store_timeout,
            self.sessions
                .delete_all_by_user_except(user_id, &credential_digest(current)),
        )
        .await?;
        tracing::info!(user_id, removed, "Logged out all other devices");
        Ok(removed)
    }

    /// Remove one of the user's sessions. Targeting the caller's own session
    /// performs a full [`logout`](Self::logout) instead.
    pub async fn terminate_session(
        &self,
        user_id: DbId,
        session_id: DbId,
        current_access: Option<&str>,
        current_refresh: Option<&str>,
    ) -> Result<Termination, CoreError> {
        let timeout = self.config.store_timeout;
        let record = bounded(timeout, self.sessions.find_by_id_for_user(session_id, user_id))
            .await?
            .ok_or(CoreError::NotFound("Session"))?;

        let is_current = present(current_refresh)
            .is_some_and(|t| credential_digest(t) == record.refresh_token_hash);
        if is_current {
            let outcome = self.logout(current_access, current_refresh).await?;
            return Ok(Termination::LoggedOutCurrent(outcome));
        }

        bounded(timeout, self.sessions.delete_by_id(record.id)).await?;
        tracing::info!(user_id, session_id, "Session terminated");
        Ok(Termination::Terminated)
    }

    /// The user's live sessions, most recently used first.
    pub async fn list_sessions(
        &self,
        user_id: DbId,
        current_refresh: Option<&str>,
    ) -> Result<Vec<SessionView>, CoreError> {
        let current_hash = present(current_refresh).map(credential_digest);
        let records = bounded(
            self.config.store_timeout,
            self.sessions.find_all_by_user(user_id, self.clock.now()),
        )
        .await?;

        Ok(records
            .into_iter()
            .map(|r| SessionView {
                is_current: current_hash.as_deref() == Some(r.refresh_token_hash.as_str()),
                id: r.id,
                device_fingerprint: r.device_fingerprint,
                origin_address: r.origin_address,
                issued_at: r.issued_at,
                last_used_at: r.last_used_at,
            })
            .collect())
    }

    /// Purge expired sessions and revocation entries.
    pub async fn sweep_expired(&self) -> Result<SweepReport, CoreError> {
        let now = self.clock.now();
        let sessions = bounded(self.config.store_timeout, self.sessions.purge_expired(now)).await?;
        let revocations = self.ledger.purge_expired(now).await?;
        Ok(SweepReport {
            sessions,
            revocations,
        })
    }

    fn issue_pair(&self, user_id: DbId, now: Timestamp) -> Result<TokenPair, CoreError> {
        let issue = |kind| {
            self.codec
                .issue(kind, user_id, now)
                .map_err(|e| CoreError::Internal(format!("Token generation error: {e}")))
        };
        Ok(TokenPair {
            access: issue(CredentialKind::Access)?,
            refresh: issue(CredentialKind::Refresh)?,
        })
    }

    async fn password_matches(&self, password: String, hash: String) -> Result<bool, CoreError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| CoreError::Internal(format!("Password verification task failed: {e}")))?
            .map_err(|e| CoreError::Internal(format!("Password verification error: {e}")))
    }

    /// Best-effort delete used for lazy cleanup; failures are logged, never returned.
    async fn discard(&self, session_id: DbId, reason: &'static str) {
        if let Err(e) = bounded(self.config.store_timeout, self.sessions.delete_by_id(session_id)).await
        {
            tracing::warn!(session_id, reason, error = %e, "Lazy session cleanup failed");
        }
    }
}
