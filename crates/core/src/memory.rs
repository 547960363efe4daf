//! In-process implementations of the storage traits.
//!
//! Each store keeps its rows behind a single `tokio::sync::RwLock`; holding the
//! write lock for a whole operation is what makes [`SessionStore::upsert`] and
//! [`SessionStore::rotate`] atomic. Expiry is enforced on read and by
//! `purge_expired`, which the API's background sweep calls periodically.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{
    CreateUser, NewSession, PendingVerification, RevocationEntry, RevocationStore, Rotation,
    SessionRecord, SessionStore, StoreError, UpsertOutcome, UserAccount, UserDirectory,
    VerificationTicket,
};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SessionTable {
    next_id: DbId,
    rows: BTreeMap<DbId, SessionRecord>,
    /// Composite key `(user_id, device_fingerprint)` -> id.
    by_device: HashMap<(DbId, String), DbId>,
    /// Refresh credential digest -> id.
    by_hash: HashMap<String, DbId>,
}

impl SessionTable {
    fn get_by_hash(&self, hash: &str) -> Option<&SessionRecord> {
        self.by_hash.get(hash).and_then(|id| self.rows.get(id))
    }

    fn insert(&mut self, session: NewSession) -> Result<SessionRecord, StoreError> {
        if self.by_hash.contains_key(&session.refresh_token_hash) {
            return Err(StoreError::Backend(
                "duplicate refresh token hash".to_string(),
            ));
        }
        self.next_id += 1;
        let record = SessionRecord {
            id: self.next_id,
            user_id: session.user_id,
            refresh_token_hash: session.refresh_token_hash,
            device_fingerprint: session.device_fingerprint,
            origin_address: session.origin_address,
            issued_at: session.issued_at,
            last_used_at: session.issued_at,
            expires_at: session.expires_at,
        };
        self.by_device
            .insert((record.user_id, record.device_fingerprint.clone()), record.id);
        self.by_hash
            .insert(record.refresh_token_hash.clone(), record.id);
        self.rows.insert(record.id, record.clone());
        Ok(record)
    }

    fn apply_rotation(&mut self, id: DbId, rotation: Rotation) -> Option<SessionRecord> {
        if self.by_hash.contains_key(&rotation.refresh_token_hash) {
            return None;
        }
        let record = self.rows.get_mut(&id)?;
        self.by_hash.remove(&record.refresh_token_hash);
        record.refresh_token_hash = rotation.refresh_token_hash;
        record.origin_address = rotation.origin_address;
        record.last_used_at = rotation.last_used_at;
        record.expires_at = rotation.expires_at;
        self.by_hash.insert(record.refresh_token_hash.clone(), id);
        Some(record.clone())
    }

    fn remove(&mut self, id: DbId) -> Option<SessionRecord> {
        let record = self.rows.remove(&id)?;
        self.by_hash.remove(&record.refresh_token_hash);
        self.by_device
            .remove(&(record.user_id, record.device_fingerprint.clone()));
        Some(record)
    }

    fn remove_where<F>(&mut self, predicate: F) -> u64
    where
        F: Fn(&SessionRecord) -> bool,
    {
        let ids: Vec<DbId> = self
            .rows
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect();
        for id in &ids {
            self.remove(*id);
        }
        ids.len() as u64
    }
}

/// Session registry held in memory.
#[derive(Default)]
pub struct MemorySessionStore {
    table: RwLock<SessionTable>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total rows including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_by_device_and_user(
        &self,
        user_id: DbId,
        device_fingerprint: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .by_device
            .get(&(user_id, device_fingerprint.to_string()))
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_credential(
        &self,
        refresh_token_hash: &str,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .get_by_hash(refresh_token_hash)
            .cloned())
    }

    async fn find_by_id_for_user(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn find_all_by_user(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let table = self.table.read().await;
        let mut sessions: Vec<SessionRecord> = table
            .rows
            .values()
            .filter(|r| r.user_id == user_id && !r.is_expired(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            b.last_used_at
                .cmp(&a.last_used_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    async fn count_by_user(&self, user_id: DbId, now: Timestamp) -> Result<u64, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.user_id == user_id && !r.is_expired(now))
            .count() as u64)
    }

    async fn upsert(
        &self,
        session: NewSession,
        device_cap: usize,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut table = self.table.write().await;
        let now = session.issued_at;

        let existing = table
            .by_device
            .get(&(session.user_id, session.device_fingerprint.clone()))
            .copied();
        if let Some(id) = existing {
            let rotation = Rotation {
                refresh_token_hash: session.refresh_token_hash,
                origin_address: session.origin_address,
                last_used_at: now,
                expires_at: session.expires_at,
            };
            return table
                .apply_rotation(id, rotation)
                .map(UpsertOutcome::Updated)
                .ok_or_else(|| StoreError::Backend("duplicate refresh token hash".to_string()));
        }

        let user_id = session.user_id;
        table.remove_where(|r| r.user_id == user_id && r.is_expired(now));

        let mut live: Vec<(Timestamp, DbId)> = table
            .rows
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| (r.last_used_at, r.id))
            .collect();
        live.sort();

        let excess = (live.len() + 1).saturating_sub(device_cap);
        let evicted: Vec<DbId> = live.iter().take(excess).map(|(_, id)| *id).collect();
        for id in &evicted {
            table.remove(*id);
        }

        let record = table.insert(session)?;
        Ok(UpsertOutcome::Inserted { record, evicted })
    }

    async fn rotate(
        &self,
        id: DbId,
        expected_hash: &str,
        rotation: Rotation,
    ) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        let current = table.rows.get(&id).map(|r| r.refresh_token_hash.as_str());
        if current != Some(expected_hash) {
            return Ok(false);
        }
        Ok(table.apply_rotation(id, rotation).is_some())
    }

    async fn delete_by_id(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(self.table.write().await.remove(id).is_some())
    }

    async fn delete_by_credential(&self, refresh_token_hash: &str) -> Result<bool, StoreError> {
        let mut table = self.table.write().await;
        match table.by_hash.get(refresh_token_hash).copied() {
            Some(id) => Ok(table.remove(id).is_some()),
            None => Ok(false),
        }
    }

    async fn delete_all_by_user_except(
        &self,
        user_id: DbId,
        keep_hash: &str,
    ) -> Result<u64, StoreError> {
        Ok(self
            .table
            .write()
            .await
            .remove_where(|r| r.user_id == user_id && r.refresh_token_hash != keep_hash))
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        Ok(self
            .table
            .write()
            .await
            .remove_where(|r| r.is_expired(now)))
    }
}

// ---------------------------------------------------------------------------
// Revocations
// ---------------------------------------------------------------------------

/// Revocation denylist held in memory.
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: RwLock<HashMap<String, RevocationEntry>>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn insert(&self, entry: RevocationEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .entry(entry.token_hash.clone())
            .or_insert(entry);
        Ok(())
    }

    async fn contains(&self, token_hash: &str, now: Timestamp) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(token_hash)
            .is_some_and(|e| now < e.expires_at))
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        Ok((before - entries.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
struct UserTable {
    next_id: DbId,
    rows: HashMap<DbId, UserAccount>,
    /// Outstanding verification tokens, keyed by account.
    pending: HashMap<DbId, VerificationTicket>,
}

impl UserTable {
    fn push(&mut self, input: CreateUser, created_at: Timestamp) -> UserAccount {
        self.next_id += 1;
        let user = UserAccount {
            id: self.next_id,
            email: input.email,
            name: input.name,
            password_hash: input.password_hash,
            role: input.role,
            is_verified: input.is_verified,
            created_at,
        };
        self.rows.insert(user.id, user.clone());
        user
    }
}

/// User accounts held in memory.
#[derive(Default)]
pub struct MemoryUserDirectory {
    table: RwLock<UserTable>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an account directly, skipping the uniqueness check.
    pub async fn insert(&self, input: CreateUser, created_at: Timestamp) -> UserAccount {
        self.table.write().await.push(input, created_at)
    }

    /// Delete an account. Returns `true` if it existed.
    pub async fn remove(&self, id: DbId) -> bool {
        let mut table = self.table.write().await;
        table.pending.remove(&id);
        table.rows.remove(&id).is_some()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .rows
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn create(
        &self,
        input: CreateUser,
        verification: Option<VerificationTicket>,
        now: Timestamp,
    ) -> Result<UserAccount, StoreError> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|u| u.email == input.email) {
            return Err(StoreError::Conflict(format!(
                "email {} is already registered",
                input.email
            )));
        }
        if let Some(ticket) = &verification {
            if table.pending.values().any(|t| t.token_hash == ticket.token_hash) {
                return Err(StoreError::Conflict("verification token reused".into()));
            }
        }
        let user = table.push(input, now);
        if let Some(ticket) = verification {
            table.pending.insert(user.id, ticket);
        }
        Ok(user)
    }

    async fn find_pending_verification(
        &self,
        token_hash: &str,
    ) -> Result<Option<PendingVerification>, StoreError> {
        Ok(self
            .table
            .read()
            .await
            .pending
            .iter()
            .find(|(_, t)| t.token_hash == token_hash)
            .map(|(&user_id, t)| PendingVerification {
                user_id,
                expires_at: t.expires_at,
            }))
    }

    async fn complete_verification(
        &self,
        user_id: DbId,
        token_hash: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let mut table = self.table.write().await;
        if table.pending.get(&user_id).map(|t| t.token_hash.as_str()) != Some(token_hash) {
            return Ok(None);
        }
        table.pending.remove(&user_id);
        Ok(table.rows.get_mut(&user_id).map(|user| {
            user.is_verified = true;
            user.clone()
        }))
    }
}
