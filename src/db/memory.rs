//! In-memory store
//!
//! Units of work are serialized behind one async mutex: a unit of work owns
//! the lock for its whole lifetime and keeps a snapshot to restore on
//! rollback. Used by the test suites and for running without PostgreSQL.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::repository::{
    Entity, RefreshTokenRepository, Repository, Store, StoreError, UnitOfWork, UserRepository,
};
use crate::models::{RefreshToken, User};

/// Rows of one entity keyed by id
#[derive(Debug, Clone)]
pub struct Table<E: Entity> {
    rows: BTreeMap<Uuid, E>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<E: Entity> Table<E> {
    pub fn get(&self, id: Uuid) -> Option<&E> {
        self.rows.get(&id)
    }

    pub fn insert(&mut self, entity: E) -> Result<E, StoreError> {
        let id = entity.id();
        if self.rows.contains_key(&id) {
            return Err(StoreError::UniqueViolation(format!("duplicate id {}", id)));
        }
        self.rows.insert(id, entity.clone());
        Ok(entity)
    }

    pub fn replace(&mut self, entity: E) -> Result<E, StoreError> {
        match self.rows.get_mut(&entity.id()) {
            Some(row) => {
                *row = entity.clone();
                Ok(entity)
            }
            None => Err(StoreError::NotFound),
        }
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        self.rows.remove(&id).is_some()
    }

    /// Remove every row matching the predicate, returning how many went
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> u64 {
        let before = self.rows.len();
        self.rows.retain(|_, row| !predicate(row));
        (before - self.rows.len()) as u64
    }

    pub fn find(&self, mut predicate: impl FnMut(&E) -> bool) -> Option<&E> {
        self.rows.values().find(|row| predicate(row))
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything the in-memory store holds
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub users: Table<User>,
    pub refresh_tokens: Table<RefreshToken>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state, for inspection
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(MemoryUnitOfWork {
            guard,
            snapshot: Some(snapshot),
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    // None once committed
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn users(&mut self) -> &mut dyn UserRepository {
        self
    }

    fn refresh_tokens(&mut self) -> &mut dyn RefreshTokenRepository {
        self
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        // restored by Drop
        Ok(())
    }
}

#[async_trait]
impl Repository<User, Uuid> for MemoryUnitOfWork {
    async fn get(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.guard.users.get(id).cloned())
    }

    async fn create(&mut self, user: User) -> Result<User, StoreError> {
        if self.guard.users.find(|u| u.email == user.email).is_some() {
            return Err(StoreError::UniqueViolation(format!(
                "email {} already exists",
                user.email
            )));
        }
        self.guard.users.insert(user)
    }

    async fn update(&mut self, user: User) -> Result<User, StoreError> {
        if self
            .guard
            .users
            .find(|u| u.email == user.email && u.id != user.id)
            .is_some()
        {
            return Err(StoreError::UniqueViolation(format!(
                "email {} already exists",
                user.email
            )));
        }
        let user = User {
            updated_at: Utc::now(),
            ..user
        };
        self.guard.users.replace(user)
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.guard.users.remove(id);
        if removed {
            // mirrors ON DELETE CASCADE
            self.guard.refresh_tokens.remove_where(|t| t.user_id == id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl UserRepository for MemoryUnitOfWork {
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        // the whole store is already held by this unit of work
        Ok(self.guard.users.get(id).cloned())
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.guard.users.find(|u| u.email == email).cloned())
    }

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        Ok(self
            .guard
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Repository<RefreshToken, Uuid> for MemoryUnitOfWork {
    async fn get(&mut self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self.guard.refresh_tokens.get(id).cloned())
    }

    async fn create(&mut self, token: RefreshToken) -> Result<RefreshToken, StoreError> {
        if self.guard.users.get(token.user_id).is_none() {
            return Err(StoreError::Database(format!(
                "user {} does not exist",
                token.user_id
            )));
        }
        if self
            .guard
            .refresh_tokens
            .find(|t| t.token_digest == token.token_digest)
            .is_some()
        {
            return Err(StoreError::UniqueViolation("duplicate token digest".to_string()));
        }
        self.guard.refresh_tokens.insert(token)
    }

    async fn update(&mut self, token: RefreshToken) -> Result<RefreshToken, StoreError> {
        let token = RefreshToken {
            updated_at: Utc::now(),
            ..token
        };
        self.guard.refresh_tokens.replace(token)
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.guard.refresh_tokens.remove(id))
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryUnitOfWork {
    async fn find_by_digest(&mut self, digest: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(self
            .guard
            .refresh_tokens
            .find(|t| t.token_digest == digest)
            .cloned())
    }

    async fn delete_for_user(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .guard
            .refresh_tokens
            .remove_where(|t| t.user_id == user_id))
    }

    async fn delete_others_for_user(
        &mut self,
        user_id: Uuid,
        keep: Uuid,
    ) -> Result<u64, StoreError> {
        Ok(self
            .guard
            .refresh_tokens
            .remove_where(|t| t.user_id == user_id && t.id != keep))
    }

    async fn swap_digest(
        &mut self,
        id: Uuid,
        expected_digest: &str,
        new_digest: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let current = match self.guard.refresh_tokens.get(id) {
            Some(row) if row.token_digest == expected_digest => row.clone(),
            _ => return Ok(false),
        };
        self.guard.refresh_tokens.replace(RefreshToken {
            token_digest: new_digest.to_string(),
            expires_at: new_expires_at,
            updated_at: Utc::now(),
            ..current
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(email.to_string(), "Test".to_string(), "User".to_string(), None)
    }

    #[tokio::test]
    async fn test_commit_persists_changes() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.users().create(user("a@example.com")).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.snapshot().await.users.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_changes() {
        let store = MemoryStore::new();

        let mut uow = store.begin().await.unwrap();
        uow.users().create(user("a@example.com")).await.unwrap();
        uow.rollback().await.unwrap();
        assert!(store.snapshot().await.users.is_empty());

        {
            let mut uow = store.begin().await.unwrap();
            uow.users().create(user("b@example.com")).await.unwrap();
        }
        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.users().create(user("dup@example.com")).await.unwrap();

        let result = uow.users().create(user("dup@example.com")).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn test_swap_digest_is_compare_and_swap() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let owner = uow.users().create(user("c@example.com")).await.unwrap();
        let expires_at = Utc::now() + Duration::hours(1);
        let row = uow
            .refresh_tokens()
            .create(RefreshToken::new(owner.id, "old".to_string(), expires_at))
            .await
            .unwrap();

        let swapped = uow
            .refresh_tokens()
            .swap_digest(row.id, "old", "new", expires_at)
            .await
            .unwrap();
        assert!(swapped);

        let swapped_again = uow
            .refresh_tokens()
            .swap_digest(row.id, "old", "newer", expires_at)
            .await
            .unwrap();
        assert!(!swapped_again);

        let stored = uow.refresh_tokens().find_by_digest("new").await.unwrap();
        assert_eq!(stored.map(|t| t.id), Some(row.id));
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_refresh_tokens() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        let owner = uow.users().create(user("d@example.com")).await.unwrap();
        uow.refresh_tokens()
            .create(RefreshToken::new(
                owner.id,
                "digest".to_string(),
                Utc::now() + Duration::hours(1),
            ))
            .await
            .unwrap();

        assert!(uow.users().delete(owner.id).await.unwrap());
        assert!(uow
            .refresh_tokens()
            .find_by_digest("digest")
            .await
            .unwrap()
            .is_none());
    }
}
