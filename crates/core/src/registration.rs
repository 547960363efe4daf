//! Account registration and email verification.
//!
//! New accounts start unverified. Registration stores the digest of a random
//! verification token and mails the plaintext; redeeming it before
//! [`SessionConfig::verification_ttl`] elapses marks the account verified so
//! [`SessionManager::login`](crate::session::SessionManager::login) accepts it.

use std::sync::Arc;

use rand::Rng;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::credential::credential_digest;
use crate::error::CoreError;
use crate::mailer::Mailer;
use crate::password::{hash_password, validate_password_strength, MIN_PASSWORD_LENGTH};
use crate::roles::Role;
use crate::store::{bounded, CreateUser, PublicUser, UserDirectory, VerificationTicket};

/// Length of a generated verification token.
const VERIFICATION_TOKEN_LENGTH: usize = 64;

const EMAIL_TAKEN: &str = "User already exists with this email";
const INVALID_TOKEN: &str = "Invalid verification token";

/// Input for [`AccountService::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub user: PublicUser,
    /// Whether the verification email was handed to the mailer.
    pub email_sent: bool,
}

/// Lower-case and trim an address so lookups match what registration stored.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Generate a random alphanumeric verification token.
fn generate_verification_token() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(VERIFICATION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub struct AccountService {
    config: Arc<SessionConfig>,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(
        config: Arc<SessionConfig>,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
            clock,
        }
    }

    /// Create an unverified account and mail its verification token.
    ///
    /// A mail failure does not undo the registration; it is reported through
    /// [`RegistrationOutcome::email_sent`].
    pub async fn register(&self, input: Registration) -> Result<RegistrationOutcome, CoreError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::Validation("Name is required".into()));
        }
        let email = normalize_email(&input.email);
        if !is_plausible_email(&email) {
            return Err(CoreError::Validation("Please enter a valid email".into()));
        }
        validate_password_strength(&input.password, MIN_PASSWORD_LENGTH)
            .map_err(CoreError::Validation)?;

        let timeout = self.config.store_timeout;
        if bounded(timeout, self.users.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(EMAIL_TAKEN.into()));
        }

        let password = input.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| CoreError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| CoreError::Internal(format!("Password hashing error: {e}")))?;

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.config.verification_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| CoreError::Internal("Verification lifetime is out of range".into()))?;
        let token = generate_verification_token();
        let ticket = VerificationTicket {
            token_hash: credential_digest(&token),
            expires_at,
        };

        let account = CreateUser {
            email,
            name,
            password_hash,
            role: Role::User,
            is_verified: false,
        };
        let user = bounded(timeout, self.users.create(account, Some(ticket), now))
            .await
            .map_err(|e| match e {
                CoreError::Conflict(_) => CoreError::Conflict(EMAIL_TAKEN.into()),
                other => other,
            })?;
        tracing::info!(user_id = user.id, "Account registered");

        let email_sent = match self.mailer.send_verification(&user.email, &token).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Verification email could not be sent");
                false
            }
        };

        Ok(RegistrationOutcome {
            user: PublicUser::from(&user),
            email_sent,
        })
    }

    /// Redeem a verification token, marking its account verified.
    ///
    /// Unknown, already used and expired tokens fail with
    /// [`CoreError::Validation`].
    pub async fn verify(&self, token: &str) -> Result<PublicUser, CoreError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CoreError::Validation("Verification token is required".into()));
        }

        let timeout = self.config.store_timeout;
        let token_hash = credential_digest(token);
        let pending = bounded(timeout, self.users.find_pending_verification(&token_hash))
            .await?
            .ok_or_else(|| CoreError::Validation(INVALID_TOKEN.into()))?;

        if self.clock.now() >= pending.expires_at {
            tracing::info!(user_id = pending.user_id, "Verification rejected: token expired");
            return Err(CoreError::Validation("Verification token has expired".into()));
        }

        let user = bounded(
            timeout,
            self.users.complete_verification(pending.user_id, &token_hash),
        )
        .await?
        .ok_or_else(|| CoreError::Validation(INVALID_TOKEN.into()))?;
        tracing::info!(user_id = user.id, "Account verified");

        Ok(PublicUser::from(&user))
    }
}
