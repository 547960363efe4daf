//! Revoked access token row.

use sqlx::FromRow;
use warden_core::types::{DbId, Timestamp};

/// A row from the `revoked_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct RevokedToken {
    pub id: DbId,
    pub token_hash: String,
    pub user_id: DbId,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
}
