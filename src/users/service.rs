//! User registration and activation

use std::sync::Arc;

use uuid::Uuid;

use super::delivery::InviteDelivery;
use crate::auth::{AuthError, InviteTokenCodec, PasswordHasher};
use crate::db::{Store, StoreError, UnitOfWork};
use crate::models::{NewUser, User};

#[derive(Clone)]
pub struct UserService<S: Store> {
    store: S,
    hasher: PasswordHasher,
    invites: Arc<InviteTokenCodec>,
    delivery: Arc<dyn InviteDelivery>,
}

impl<S: Store> UserService<S> {
    pub fn new(
        store: S,
        hasher: PasswordHasher,
        invites: Arc<InviteTokenCodec>,
        delivery: Arc<dyn InviteDelivery>,
    ) -> Self {
        Self {
            store,
            hasher,
            invites,
            delivery,
        }
    }

    /// Create a user and send them an invite.
    ///
    /// The password is optional; without one the account stays pending until
    /// the invite is accepted.
    pub async fn register(&self, new_user: NewUser) -> Result<User, AuthError> {
        let mut uow = self.store.begin().await?;

        if uow.users().find_by_email(&new_user.email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = match new_user.password.as_deref() {
            Some(password) if !password.is_empty() => Some(self.hasher.hash(password).await?),
            _ => None,
        };

        let user = uow
            .users()
            .create(User::new(
                new_user.email,
                new_user.first_name,
                new_user.last_name,
                password_hash,
            ))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => AuthError::EmailAlreadyExists,
                other => AuthError::Storage(other),
            })?;

        let invite_token = self.invites.issue(&user)?;

        uow.commit().await?;
        tracing::info!(user_id = %user.id, active = user.is_active(), "User registered");

        if let Err(e) = self.delivery.deliver(&user, &invite_token).await {
            tracing::warn!(user_id = %user.id, error = %e, "Invite delivery failed");
        }

        Ok(user)
    }

    /// Redeem an invite by setting the user's password
    pub async fn accept_invite(&self, invite_token: &str, password: &str) -> Result<User, AuthError> {
        let claims = self
            .invites
            .parse(invite_token)
            .map_err(|_| AuthError::InvalidInvite)?;

        let mut uow = self.store.begin().await?;

        let mut user = uow
            .users()
            .get_for_update(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !claims.matches(&user) {
            tracing::info!(user_id = %user.id, "Invite no longer matches account state");
            return Err(AuthError::InvalidInvite);
        }

        user.password_hash = Some(self.hasher.hash(password).await?);
        let user = uow.users().update(user).await.map_err(|e| match e {
            StoreError::NotFound => AuthError::UserNotFound,
            other => AuthError::Storage(other),
        })?;

        uow.commit().await?;
        tracing::info!(user_id = %user.id, "Invite accepted, account active");

        Ok(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        let mut uow = self.store.begin().await?;
        let user = uow.users().get(user_id).await?;
        uow.commit().await?;

        user.ok_or(AuthError::UserNotFound)
    }

    pub async fn search_users(&self, user_ids: &[Uuid]) -> Result<Vec<User>, AuthError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut uow = self.store.begin().await?;
        let users = uow.users().find_by_ids(user_ids).await?;
        uow.commit().await?;

        Ok(users)
    }
}
