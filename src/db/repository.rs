//! Persistence capabilities used by the services
//!
//! `Repository<T, Id>` is the generic CRUD capability; entity repositories
//! extend it with their own queries. Every call runs inside a [`UnitOfWork`]
//! begun from a [`Store`], which commits or rolls back as a whole.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{RefreshToken, User};

/// Persistence errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation(db_err.message().to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

/// Anything stored in a keyed table
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

impl Entity for User {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for RefreshToken {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Generic CRUD capability over an entity type
#[async_trait]
pub trait Repository<T, Id>: Send
where
    T: Send + 'static,
    Id: Send + 'static,
{
    async fn get(&mut self, id: Id) -> Result<Option<T>, StoreError>;

    async fn create(&mut self, entity: T) -> Result<T, StoreError>;

    /// Overwrite a stored entity. Fails with `NotFound` when it does not exist.
    async fn update(&mut self, entity: T) -> Result<T, StoreError>;

    /// Returns whether a row was removed
    async fn delete(&mut self, id: Id) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserRepository: Repository<User, Uuid> {
    /// Fetch a user and hold the row for the rest of the unit of work
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<User>, StoreError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Repository<RefreshToken, Uuid> {
    /// Find a row by digest and hold it, and its owner, for the rest of the
    /// unit of work
    async fn find_by_digest(&mut self, digest: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Delete every row owned by the user, serialized against concurrent
    /// callers for the same user
    async fn delete_for_user(&mut self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete every row owned by the user except `keep`
    async fn delete_others_for_user(&mut self, user_id: Uuid, keep: Uuid)
        -> Result<u64, StoreError>;

    /// Swap the digest and expiry of row `id` if its digest is still
    /// `expected_digest`. Returns false when the swap lost a race.
    async fn swap_digest(
        &mut self,
        id: Uuid,
        expected_digest: &str,
        new_digest: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// A transaction spanning one service operation.
///
/// Dropping a unit of work without committing rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    fn users(&mut self) -> &mut dyn UserRepository;

    fn refresh_tokens(&mut self) -> &mut dyn RefreshTokenRepository;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Source of units of work
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
