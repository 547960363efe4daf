//! User row.

use sqlx::FromRow;
use warden_core::roles::Role;
use warden_core::store::{StoreError, UserAccount};
use warden_core::types::{DbId, Timestamp};

/// Full user row from the `users` table.
///
/// Contains the password hash -- NEVER serialize this to API responses directly.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
    pub is_verified: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<User> for UserAccount {
    type Error = StoreError;

    fn try_from(row: User) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: String| StoreError::Backend(format!("user {}: {e}", row.id)))?;
        Ok(Self {
            id: row.id,
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role,
            is_verified: row.is_verified,
            created_at: row.created_at,
        })
    }
}
