//! Repository for the `user_sessions` table.

use sqlx::PgPool;
use warden_core::store::{NewSession, Rotation};
use warden_core::types::{DbId, Timestamp};

use crate::models::session::UserSession;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, refresh_token_hash, device_fingerprint, origin_address, \
                        issued_at, last_used_at, expires_at, created_at, updated_at";

/// Result of [`SessionRepo::upsert_within_cap`].
#[derive(Debug)]
pub enum UpsertedSession {
    Updated(UserSession),
    Inserted {
        row: UserSession,
        evicted: Vec<DbId>,
    },
}

/// Provides CRUD operations for user sessions.
pub struct SessionRepo;

impl SessionRepo {
    /// Find the session for a user's device.
    pub async fn find_by_device_and_user(
        pool: &PgPool,
        user_id: DbId,
        device_fingerprint: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1 AND device_fingerprint = $2"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .bind(device_fingerprint)
            .fetch_optional(pool)
            .await
    }

    /// Find a session by its refresh token hash, expired or not.
    pub async fn find_by_refresh_token_hash(
        pool: &PgPool,
        hash: &str,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE refresh_token_hash = $1");
        sqlx::query_as::<_, UserSession>(&query)
            .bind(hash)
            .fetch_optional(pool)
            .await
    }

    /// Find a session by ID, only if it belongs to `user_id`.
    pub async fn find_by_id_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<UserSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_sessions WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, UserSession>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's unexpired sessions, most recently used first.
    pub async fn list_active_for_user(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<UserSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_sessions
             WHERE user_id = $1 AND expires_at > $2
             ORDER BY last_used_at DESC, id DESC"
        );
        sqlx::query_as::<_, UserSession>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Count a user's unexpired sessions.
    pub async fn count_active_for_user(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_sessions WHERE user_id = $1 AND expires_at > $2",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    /// Insert or update the session for `(user_id, device_fingerprint)` while
    /// keeping the user at or below `device_cap` sessions.
    ///
    /// Runs in one transaction holding a per-user advisory lock, so concurrent
    /// logins for the same user are serialized and the cap is never exceeded.
    pub async fn upsert_within_cap(
        pool: &PgPool,
        input: &NewSession,
        device_cap: usize,
    ) -> Result<UpsertedSession, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let now = input.issued_at;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(input.user_id)
            .execute(&mut *tx)
            .await?;

        let update = format!(
            "UPDATE user_sessions SET
                refresh_token_hash = $3,
                origin_address = $4,
                last_used_at = $5,
                expires_at = $6
             WHERE user_id = $1 AND device_fingerprint = $2
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, UserSession>(&update)
            .bind(input.user_id)
            .bind(&input.device_fingerprint)
            .bind(&input.refresh_token_hash)
            .bind(&input.origin_address)
            .bind(now)
            .bind(input.expires_at)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = updated {
            tx.commit().await?;
            return Ok(UpsertedSession::Updated(row));
        }

        sqlx::query("DELETE FROM user_sessions WHERE user_id = $1 AND expires_at <= $2")
            .bind(input.user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let live: Vec<DbId> = sqlx::query_scalar(
            "SELECT id FROM user_sessions
             WHERE user_id = $1
             ORDER BY last_used_at ASC, id ASC",
        )
        .bind(input.user_id)
        .fetch_all(&mut *tx)
        .await?;

        let excess = (live.len() + 1).saturating_sub(device_cap);
        let evicted: Vec<DbId> = live.into_iter().take(excess).collect();
        if !evicted.is_empty() {
            sqlx::query("DELETE FROM user_sessions WHERE id = ANY($1)")
                .bind(&evicted)
                .execute(&mut *tx)
                .await?;
        }

        let insert = format!(
            "INSERT INTO user_sessions
                (user_id, refresh_token_hash, device_fingerprint, origin_address,
                 issued_at, last_used_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $5, $6)
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserSession>(&insert)
            .bind(input.user_id)
            .bind(&input.refresh_token_hash)
            .bind(&input.device_fingerprint)
            .bind(&input.origin_address)
            .bind(now)
            .bind(input.expires_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(UpsertedSession::Inserted { row, evicted })
    }

    /// Replace the refresh credential of session `id`, but only while its
    /// current hash is still `expected_hash`. Returns `true` if applied.
    pub async fn rotate(
        pool: &PgPool,
        id: DbId,
        expected_hash: &str,
        rotation: &Rotation,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_sessions SET
                refresh_token_hash = $3,
                origin_address = $4,
                last_used_at = $5,
                expires_at = $6
             WHERE id = $1 AND refresh_token_hash = $2",
        )
        .bind(id)
        .bind(expected_hash)
        .bind(&rotation.refresh_token_hash)
        .bind(&rotation.origin_address)
        .bind(rotation.last_used_at)
        .bind(rotation.expires_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the session holding `hash`. Returns `true` if a row was removed.
    pub async fn delete_by_refresh_token_hash(
        pool: &PgPool,
        hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE refresh_token_hash = $1")
            .bind(hash)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all of a user's sessions except the one holding `keep_hash`.
    pub async fn delete_all_for_user_except(
        pool: &PgPool,
        user_id: DbId,
        keep_hash: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_sessions WHERE user_id = $1 AND refresh_token_hash <> $2",
        )
        .bind(user_id)
        .bind(keep_hash)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete sessions with `expires_at <= now`. Returns the count of deleted rows.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
