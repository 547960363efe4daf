//! Revocation ledger: access credentials invalidated before natural expiry.
//!
//! Entries are keyed by credential digest and live exactly as long as the
//! credential they shadow. Once a credential has expired it is rejected on
//! expiry grounds alone, so its entry can be dropped.

use std::sync::Arc;
use std::time::Duration;

use crate::credential::{credential_digest, from_unix, CredentialCodec, CredentialKind};
use crate::error::CoreError;
use crate::store::{bounded, RevocationEntry, RevocationStore};
use crate::types::Timestamp;

/// Outcome of [`RevocationLedger::revoke`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// An entry now shadows the credential (new or already present).
    Recorded,
    /// The credential had already expired; nothing to record.
    AlreadyExpired,
    /// The credential does not verify under the access secret and can never be
    /// accepted, so it is not recorded.
    Unverifiable,
}

pub struct RevocationLedger {
    codec: Arc<CredentialCodec>,
    store: Arc<dyn RevocationStore>,
    timeout: Duration,
}

impl RevocationLedger {
    pub fn new(
        codec: Arc<CredentialCodec>,
        store: Arc<dyn RevocationStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            codec,
            store,
            timeout,
        }
    }

    /// Record `token` as revoked until its own expiry. Idempotent.
    pub async fn revoke(&self, token: &str, now: Timestamp) -> Result<Revocation, CoreError> {
        let Ok(claims) = self.codec.decode(CredentialKind::Access, token) else {
            return Ok(Revocation::Unverifiable);
        };
        let expires_at = from_unix(claims.exp).map_err(|_| {
            CoreError::Internal("access token carries an out-of-range expiry".into())
        })?;
        if now >= expires_at {
            return Ok(Revocation::AlreadyExpired);
        }

        let entry = RevocationEntry {
            token_hash: credential_digest(token),
            user_id: claims.sub,
            expires_at,
        };
        bounded(self.timeout, self.store.insert(entry)).await?;
        tracing::debug!(user_id = claims.sub, %expires_at, "Access token revoked");
        Ok(Revocation::Recorded)
    }

    pub async fn is_revoked(&self, token: &str, now: Timestamp) -> Result<bool, CoreError> {
        bounded(
            self.timeout,
            self.store.contains(&credential_digest(token), now),
        )
        .await
    }

    /// Drop entries whose credentials have expired.
    pub async fn purge_expired(&self, now: Timestamp) -> Result<u64, CoreError> {
        bounded(self.timeout, self.store.purge_expired(now)).await
    }
}
