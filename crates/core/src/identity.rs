//! Resolve the caller behind a request from its access credential.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::credential::{CredentialCodec, CredentialKind};
use crate::error::CoreError;
use crate::ledger::RevocationLedger;
use crate::store::{bounded, PublicUser, UserDirectory};

/// Where a request may carry its access credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialSource<'a> {
    /// Raw `Authorization` header value.
    pub authorization: Option<&'a str>,
    /// Value of the access credential cookie.
    pub cookie: Option<&'a str>,
}

impl<'a> CredentialSource<'a> {
    /// The presented access credential. A `Bearer` header wins over the cookie.
    /// The scheme name is matched case-insensitively.
    pub fn access_token(&self) -> Option<&'a str> {
        self.authorization
            .and_then(|h| h.trim_start().split_once(' '))
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
            .map(|(_, token)| token.trim())
            .filter(|t| !t.is_empty())
            .or_else(|| self.cookie.map(str::trim).filter(|t| !t.is_empty()))
    }
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user: PublicUser,
    /// The credential the caller authenticated with.
    pub access_token: String,
}

pub struct IdentityVerifier {
    codec: Arc<CredentialCodec>,
    ledger: Arc<RevocationLedger>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl IdentityVerifier {
    pub fn new(
        codec: Arc<CredentialCodec>,
        ledger: Arc<RevocationLedger>,
        users: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            codec,
            ledger,
            users,
            clock,
            timeout,
        }
    }

    /// Authenticate the request.
    ///
    /// Checks run in order: presence, revocation, signature and expiry, user
    /// existence. The first failing check decides the error.
    pub async fn resolve(&self, source: CredentialSource<'_>) -> Result<UserIdentity, CoreError> {
        let token = source
            .access_token()
            .ok_or_else(|| CoreError::Unauthorized("Missing authentication token".into()))?;

        let now = self.clock.now();
        if self.ledger.is_revoked(token, now).await? {
            return Err(CoreError::Unauthorized("Token has been revoked".into()));
        }

        let user_id = self
            .codec
            .verify(CredentialKind::Access, token, now)
            .map_err(|_| CoreError::Unauthorized("Invalid or expired token".into()))?;

        let user = bounded(self.timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or(CoreError::NotFound("User"))?;

        Ok(UserIdentity {
            user: PublicUser::from(&user),
            access_token: token.to_string(),
        })
    }
}
