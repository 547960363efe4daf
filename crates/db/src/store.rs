//! Postgres-backed implementations of the `warden-core` storage traits.

use async_trait::async_trait;
use warden_core::store::{
    CreateUser, NewSession, PendingVerification, RevocationEntry, RevocationStore, Rotation,
    SessionRecord, SessionStore, StoreError, UpsertOutcome, UserAccount, UserDirectory,
    VerificationTicket,
};
use warden_core::types::{DbId, Timestamp};

use crate::repositories::session_repo::UpsertedSession;
use crate::repositories::{RevokedTokenRepo, SessionRepo, UserRepo};
use crate::DbPool;

/// PostgreSQL unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Classify a driver error as transient (retryable), a uniqueness conflict,
/// or a backend failure.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(ref db_err)
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db_err.constraint().is_some_and(|c| c.starts_with("uq_")) =>
        {
            let constraint = db_err.constraint().unwrap_or("unknown");
            StoreError::Conflict(format!("duplicate value violates {constraint}"))
        }
        other => {
            tracing::error!(error = %other, "Database error");
            StoreError::Backend(other.to_string())
        }
    }
}

fn to_account(row: Option<crate::models::user::User>) -> Result<Option<UserAccount>, StoreError> {
    row.map(UserAccount::try_from).transpose()
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_by_device_and_user(
        &self,
        user_id: DbId,
        device_fingerprint: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        SessionRepo::find_by_device_and_user(&self.pool, user_id, device_fingerprint)
            .await
            .map(|row| row.map(SessionRecord::from))
            .map_err(classify)
    }

    async fn find_by_credential(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        SessionRepo::find_by_refresh_token_hash(&self.pool, refresh_token_hash)
            .await
            .map(|row| row.map(SessionRecord::from))
            .map_err(classify)
    }

    async fn find_by_id_for_user(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        SessionRepo::find_by_id_for_user(&self.pool, id, user_id)
            .await
            .map(|row| row.map(SessionRecord::from))
            .map_err(classify)
    }

    async fn find_all_by_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let rows = SessionRepo::list_active_for_user(&self.pool, user_id, now)
            .await
            .map_err(classify)?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    async fn count_by_user(&self, user_id: DbId, now: Timestamp) -> Result<u64, StoreError> {
        let count = SessionRepo::count_active_for_user(&self.pool, user_id, now)
            .await
            .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn upsert(
        &self,
        session: NewSession,
        device_cap: usize,
    ) -> Result<UpsertOutcome, StoreError> {
        let outcome = SessionRepo::upsert_within_cap(&self.pool, &session, device_cap)
            .await
            .map_err(classify)?;
        Ok(match outcome {
            UpsertedSession::Updated(row) => UpsertOutcome::Updated(row.into()),
            UpsertedSession::Inserted { row, evicted } => UpsertOutcome::Inserted {
                record: row.into(),
                evicted,
            },
        })
    }

    async fn rotate(
        &self,
        id: DbId,
        expected_hash: &str,
        rotation: Rotation,
    ) -> Result<bool, StoreError> {
        SessionRepo::rotate(&self.pool, id, expected_hash, &rotation)
            .await
            .map_err(classify)
    }

    async fn delete_by_id(&self, id: DbId) -> Result<bool, StoreError> {
        SessionRepo::delete(&self.pool, id).await.map_err(classify)
    }

    async fn delete_by_credential(&self, refresh_token_hash: &str) -> Result<bool, StoreError> {
        SessionRepo::delete_by_refresh_token_hash(&self.pool, refresh_token_hash)
            .await
            .map_err(classify)
    }

    async fn delete_all_by_user_except(
        &self,
        user_id: DbId,
        keep_hash: &str,
    ) -> Result<u64, StoreError> {
        SessionRepo::delete_all_for_user_except(&self.pool, user_id, keep_hash)
            .await
            .map_err(classify)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        SessionRepo::delete_expired(&self.pool, now)
            .await
            .map_err(classify)
    }
}

#[derive(Clone)]
pub struct PgRevocationStore {
    pool: DbPool,
}

impl PgRevocationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn insert(&self, entry: RevocationEntry) -> Result<(), StoreError> {
        RevokedTokenRepo::insert(&self.pool, &entry)
            .await
            .map_err(classify)
    }

    async fn contains(&self, token_hash: &str, now: Timestamp) -> Result<bool, StoreError> {
        RevokedTokenRepo::find_active(&self.pool, token_hash, now)
            .await
            .map(|row| row.is_some())
            .map_err(classify)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        RevokedTokenRepo::delete_expired(&self.pool, now)
            .await
            .map_err(classify)
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        to_account(
            UserRepo::find_by_email(&self.pool, email)
                .await
                .map_err(classify)?,
        )
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<UserAccount>, StoreError> {
        to_account(UserRepo::find_by_id(&self.pool, id).await.map_err(classify)?)
    }

    async fn create(
        &self,
        input: CreateUser,
        verification: Option<VerificationTicket>,
        now: Timestamp,
    ) -> Result<UserAccount, StoreError> {
        let row = match &verification {
            Some(ticket) => {
                UserRepo::create_with_verification(&self.pool, &input, ticket, now).await
            }
            None => UserRepo::create(&self.pool, &input).await,
        }
        .map_err(classify)?;
        UserAccount::try_from(row)
    }

    async fn find_pending_verification(
        &self,
        token_hash: &str,
    ) -> Result<Option<PendingVerification>, StoreError> {
        UserRepo::find_by_verification_hash(&self.pool, token_hash)
            .await
            .map(|row| {
                row.map(|(user_id, expires_at)| PendingVerification {
                    user_id,
                    expires_at,
                })
            })
            .map_err(classify)
    }

    async fn complete_verification(
        &self,
        user_id: DbId,
        token_hash: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        to_account(
            UserRepo::complete_verification(&self.pool, user_id, token_hash)
                .await
                .map_err(classify)?,
        )
    }
}
