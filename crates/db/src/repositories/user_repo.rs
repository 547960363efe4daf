//! Repository for the `users` table.

use sqlx::PgPool;
use warden_core::store::{CreateUser, VerificationTicket};
use warden_core::types::{DbId, Timestamp};

use crate::models::user::User;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, name, password_hash, role, is_verified, created_at, updated_at";

/// Provides CRUD operations for users.
pub struct UserRepo;

impl UserRepo {
    /// Insert a new user, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, name, password_hash, role, is_verified)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.name)
            .bind(&input.password_hash)
            .bind(input.role.as_str())
            .bind(input.is_verified)
            .fetch_one(pool)
            .await
    }

    /// Insert a new user together with its pending verification token.
    ///
    /// A taken email or token digest fails with a unique violation.
    pub async fn create_with_verification(
        pool: &PgPool,
        input: &CreateUser,
        ticket: &VerificationTicket,
        created_at: Timestamp,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users
                 (email, name, password_hash, role, is_verified,
                  verification_token_hash, verification_expires_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.name)
            .bind(&input.password_hash)
            .bind(input.role.as_str())
            .bind(input.is_verified)
            .bind(&ticket.token_hash)
            .bind(ticket.expires_at)
            .bind(created_at)
            .fetch_one(pool)
            .await
    }

    /// Find the account holding a verification token digest, with its expiry.
    pub async fn find_by_verification_hash(
        pool: &PgPool,
        token_hash: &str,
    ) -> Result<Option<(DbId, Timestamp)>, sqlx::Error> {
        sqlx::query_as::<_, (DbId, Timestamp)>(
            "SELECT id, verification_expires_at FROM users
             WHERE verification_token_hash = $1 AND verification_expires_at IS NOT NULL",
        )
        .bind(token_hash)
        .fetch_optional(pool)
        .await
    }

    /// Mark a user verified and clear its token, only while it still holds
    /// `token_hash`. Returns the updated row when it applied.
    pub async fn complete_verification(
        pool: &PgPool,
        id: DbId,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!(
            "UPDATE users
             SET is_verified = TRUE,
                 verification_token_hash = NULL,
                 verification_expires_at = NULL
             WHERE id = $1 AND verification_token_hash = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(token_hash)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a user by email (case-sensitive).
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Delete a user and, by cascade, their sessions. Revocations are kept.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
