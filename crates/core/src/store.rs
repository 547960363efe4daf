//! Storage contracts for sessions, revocations, and user accounts.
//!
//! These traits are pure data access. Business rules (when to rotate, when to
//! evict, when to revoke) live in [`crate::session`]. Implementations exist in
//! [`crate::memory`] and in the `warden-db` crate.
//!
//! Credentials never reach a store in plaintext: every `*_hash` argument is the
//! [`credential_digest`](crate::credential::credential_digest) of the token.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::roles::Role;
use crate::types::{DbId, Timestamp};

/// One session per (user, device).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: DbId,
    pub user_id: DbId,
    /// Digest of the live refresh credential; unique across all records.
    pub refresh_token_hash: String,
    pub device_fingerprint: String,
    pub origin_address: String,
    pub issued_at: Timestamp,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
}

impl SessionRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Input for [`SessionStore::upsert`]. `last_used_at` starts at `issued_at`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub device_fingerprint: String,
    pub origin_address: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Fields overwritten when a session's refresh credential is rotated.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub refresh_token_hash: String,
    pub origin_address: String,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Result of [`SessionStore::upsert`].
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// An existing record for the same device was rotated in place.
    Updated(SessionRecord),
    /// A new record was inserted after evicting `evicted` (least recently used first).
    Inserted {
        record: SessionRecord,
        evicted: Vec<DbId>,
    },
}

impl UpsertOutcome {
    pub fn record(&self) -> &SessionRecord {
        match self {
            UpsertOutcome::Updated(record) => record,
            UpsertOutcome::Inserted { record, .. } => record,
        }
    }
}

/// An access credential invalidated before its natural expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationEntry {
    pub token_hash: String,
    pub user_id: DbId,
    /// The revoked credential's own expiry; the entry is useless afterwards.
    pub expires_at: Timestamp,
}

/// A user account as seen by the session engine.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: DbId,
    pub email: String,
    pub name: String,
    /// PHC-formatted Argon2id hash. Never serialize this.
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: Timestamp,
}

/// DTO for provisioning a user account.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_verified: bool,
}

/// A verification token to attach to a new account. Only its digest is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationTicket {
    pub token_hash: String,
    pub expires_at: Timestamp,
}

/// An account awaiting email verification, found by its token digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingVerification {
    pub user_id: DbId,
    pub expires_at: Timestamp,
}

/// Safe user representation for API responses (no password hash).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub id: DbId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: Timestamp,
}

impl From<&UserAccount> for PublicUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or timed out. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write.
    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CoreError::StoreUnavailable(msg),
            StoreError::Conflict(msg) => CoreError::Conflict(msg),
            StoreError::Backend(msg) => CoreError::Internal(msg),
        }
    }
}

/// Run a store operation with an upper bound on its duration.
///
/// Elapsing the bound yields the retryable [`CoreError::StoreUnavailable`].
pub async fn bounded<T, F>(limit: Duration, op: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(CoreError::from),
        Err(_) => Err(CoreError::StoreUnavailable(format!(
            "operation timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Registry of device sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_device_and_user(
        &self,
        user_id: DbId,
        device_fingerprint: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Look up by refresh credential digest. Expired records are still returned.
    async fn find_by_credential(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<SessionRecord>, StoreError>;

    async fn find_by_id_for_user(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Unexpired sessions of `user_id`, most recently used first.
    async fn find_all_by_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, StoreError>;

    /// Number of unexpired sessions of `user_id`.
    async fn count_by_user(&self, user_id: DbId, now: Timestamp) -> Result<u64, StoreError>;

    /// Atomically insert or update the session for `(user_id, device_fingerprint)`.
    ///
    /// An existing record for the device is rotated in place with no cap check.
    /// Otherwise the user's expired records are dropped and the least recently
    /// used ones (ties: smallest id) are evicted until fewer than `device_cap`
    /// remain, then the new record is inserted. Runs as one step per user.
    async fn upsert(
        &self,
        session: NewSession,
        device_cap: usize,
    ) -> Result<UpsertOutcome, StoreError>;

    /// Compare-and-swap rotation: applies only while the record's current
    /// credential digest equals `expected_hash`. Returns whether it applied.
    async fn rotate(
        &self,
        id: DbId,
        expected_hash: &str,
        rotation: Rotation,
    ) -> Result<bool, StoreError>;

    async fn delete_by_id(&self, id: DbId) -> Result<bool, StoreError>;

    async fn delete_by_credential(&self, refresh_token_hash: &str) -> Result<bool, StoreError>;

    /// Delete every session of `user_id` except the one holding `keep_hash`.
    async fn delete_all_by_user_except(
        &self,
        user_id: DbId,
        keep_hash: &str,
    ) -> Result<u64, StoreError>;

    /// Remove records with `expires_at <= now`.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// Denylist of access credentials.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Insert an entry; inserting an existing digest is a no-op.
    async fn insert(&self, entry: RevocationEntry) -> Result<(), StoreError>;

    /// Whether `token_hash` has an entry that has not yet expired.
    async fn contains(&self, token_hash: &str, now: Timestamp) -> Result<bool, StoreError>;

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError>;
}

/// User accounts and their pending email verifications.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<UserAccount>, StoreError>;

    /// Insert an account, optionally with a pending verification token.
    ///
    /// Fails with [`StoreError::Conflict`] when the email is already taken.
    async fn create(
        &self,
        input: CreateUser,
        verification: Option<VerificationTicket>,
        now: Timestamp,
    ) -> Result<UserAccount, StoreError>;

    /// The account holding verification token `token_hash`, expired or not.
    async fn find_pending_verification(
        &self,
        token_hash: &str,
    ) -> Result<Option<PendingVerification>, StoreError>;

    /// Mark `user_id` verified and clear its token, but only while it still
    /// holds `token_hash`. Returns the updated account when it applied.
    async fn complete_verification(
        &self,
        user_id: DbId,
        token_hash: &str,
    ) -> Result<Option<UserAccount>, StoreError>;
}
