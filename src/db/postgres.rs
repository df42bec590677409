//! PostgreSQL store backed by sqlx transactions

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repository::{
    RefreshTokenRepository, Repository, Store, StoreError, UnitOfWork, UserRepository,
};
use crate::models::{RefreshToken, User};

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password_hash, created_at, updated_at";

const REFRESH_TOKEN_COLUMNS: &str = "id, user_id, token_digest, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork { tx })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// One database transaction. sqlx rolls it back if it is dropped uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn users(&mut self) -> &mut dyn UserRepository {
        self
    }

    fn refresh_tokens(&mut self) -> &mut dyn RefreshTokenRepository {
        self
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl Repository<User, Uuid> for PgUnitOfWork {
    async fn get(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn create(&mut self, user: User) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn update(&mut self, user: User) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = $2, last_name = $3, email = $4, password_hash = $5, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(user)
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl UserRepository for PgUnitOfWork {
    async fn get_for_update(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(user)
    }

    async fn find_by_ids(&mut self, ids: &[Uuid]) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ANY($1) ORDER BY created_at ASC",
            USER_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(users)
    }
}

#[async_trait]
impl Repository<RefreshToken, Uuid> for PgUnitOfWork {
    async fn get(&mut self, id: Uuid) -> Result<Option<RefreshToken>, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE id = $1",
            REFRESH_TOKEN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(token)
    }

    async fn create(&mut self, token: RefreshToken) -> Result<RefreshToken, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_digest, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            REFRESH_TOKEN_COLUMNS
        ))
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_digest)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.updated_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(token)
    }

    async fn update(&mut self, token: RefreshToken) -> Result<RefreshToken, StoreError> {
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            r#"
            UPDATE refresh_tokens
            SET token_digest = $2, expires_at = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            REFRESH_TOKEN_COLUMNS
        ))
        .bind(token.id)
        .bind(&token.token_digest)
        .bind(token.expires_at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(token)
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }
}

#[async_trait]
impl RefreshTokenRepository for PgUnitOfWork {
    async fn find_by_digest(&mut self, digest: &str) -> Result<Option<RefreshToken>, StoreError> {
        // Owner first, then the row: the same order as delete_for_user, so
        // refreshes and logins of one user queue instead of deadlocking.
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM refresh_tokens WHERE token_digest = $1")
                .bind(digest)
                .fetch_optional(&mut *self.tx)
                .await?;
        let Some(owner) = owner else {
            return Ok(None);
        };
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?;

        // Re-read under the lock: a concurrent redeemer that got here first
        // has rotated or deleted the row by now.
        let token = sqlx::query_as::<_, RefreshToken>(&format!(
            "SELECT {} FROM refresh_tokens WHERE token_digest = $1 FOR UPDATE",
            REFRESH_TOKEN_COLUMNS
        ))
        .bind(digest)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(token)
    }

    async fn delete_for_user(&mut self, user_id: Uuid) -> Result<u64, StoreError> {
        // Lock the owner so concurrent logins for one user run one at a time
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        let rows_affected = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn delete_others_for_user(
        &mut self,
        user_id: Uuid,
        keep: Uuid,
    ) -> Result<u64, StoreError> {
        let rows_affected =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND id <> $2")
                .bind(user_id)
                .bind(keep)
                .execute(&mut *self.tx)
                .await?
                .rows_affected();

        Ok(rows_affected)
    }

    async fn swap_digest(
        &mut self,
        id: Uuid,
        expected_digest: &str,
        new_digest: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_digest = $3, expires_at = $4, updated_at = NOW()
            WHERE id = $1 AND token_digest = $2
            "#,
        )
        .bind(id)
        .bind(expected_digest)
        .bind(new_digest)
        .bind(new_expires_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}
