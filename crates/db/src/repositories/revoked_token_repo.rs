//! Repository for the `revoked_tokens` table.

use sqlx::PgPool;
use warden_core::store::RevocationEntry;
use warden_core::types::Timestamp;

use crate::models::revoked_token::RevokedToken;

const COLUMNS: &str = "id, token_hash, user_id, expires_at, created_at";

pub struct RevokedTokenRepo;

impl RevokedTokenRepo {
    /// Record a revoked token. Inserting an existing hash is a no-op.
    pub async fn insert(pool: &PgPool, entry: &RevocationEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO revoked_tokens (token_hash, user_id, expires_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(&entry.token_hash)
        .bind(entry.user_id)
        .bind(entry.expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find an entry that is still in force at `now`.
    pub async fn find_active(
        pool: &PgPool,
        token_hash: &str,
        now: Timestamp,
    ) -> Result<Option<RevokedToken>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM revoked_tokens WHERE token_hash = $1 AND expires_at > $2"
        );
        sqlx::query_as::<_, RevokedToken>(&query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Delete entries whose tokens have expired. Returns the count of deleted rows.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
