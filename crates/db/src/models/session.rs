//! User session row.

use sqlx::FromRow;
use warden_core::store::SessionRecord;
use warden_core::types::{DbId, Timestamp};

/// A row from the `user_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserSession {
    pub id: DbId,
    pub user_id: DbId,
    pub refresh_token_hash: String,
    pub device_fingerprint: String,
    pub origin_address: String,
    pub issued_at: Timestamp,
    pub last_used_at: Timestamp,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<UserSession> for SessionRecord {
    fn from(row: UserSession) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            refresh_token_hash: row.refresh_token_hash,
            device_fingerprint: row.device_fingerprint,
            origin_address: row.origin_address,
            issued_at: row.issued_at,
            last_used_at: row.last_used_at,
            expires_at: row.expires_at,
        }
    }
}
