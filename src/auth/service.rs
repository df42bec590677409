//! Authentication service
//!
//! Login and refresh. Each call runs in its own unit of work and rolls back
//! on failure, except that an expired refresh token stays deleted.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::jwt::AccessTokenCodec;
use super::password::PasswordHasher;
use super::refresh;
use super::AuthError;
use crate::db::{Store, UnitOfWork};
use crate::models::TokenPair;

/// Hashed once and verified against when the email is unknown
const DUMMY_PASSWORD: &str = "unknown-account-placeholder";

/// Authentication service
#[derive(Clone)]
pub struct AuthService<S: Store> {
    store: S,
    hasher: PasswordHasher,
    access_tokens: Arc<AccessTokenCodec>,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
    dummy_hash: Arc<OnceCell<String>>,
}

impl<S: Store> AuthService<S> {
    pub fn new(
        store: S,
        hasher: PasswordHasher,
        access_tokens: Arc<AccessTokenCodec>,
        access_token_ttl: Duration,
        refresh_token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            hasher,
            access_tokens,
            access_token_ttl,
            refresh_token_ttl,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Verify credentials and start a new session, superseding any previous
    /// one for the same user
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let mut uow = self.store.begin().await?;

        let user = match uow.users().find_by_email(email).await? {
            Some(user) => user,
            None => {
                uow.rollback().await?;
                self.verify_against_dummy(password).await;
                return Err(AuthError::UserNotFound);
            }
        };

        if !self
            .hasher
            .verify(user.password_hash.as_deref(), password)
            .await
        {
            uow.rollback().await?;
            tracing::info!(user_id = %user.id, "Login rejected: invalid credentials");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.access_tokens.issue(user.id, self.access_token_ttl)?;
        let refresh_token =
            refresh::issue_for(uow.refresh_tokens(), user.id, self.refresh_token_ttl).await?;

        uow.commit().await?;
        tracing::info!(user_id = %user.id, "User logged in");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh secret for a new access token and a rotated secret
    pub async fn refresh(&self, refresh_secret: &str) -> Result<TokenPair, AuthError> {
        let mut uow = self.store.begin().await?;

        let redeemed = match refresh::redeem(uow.refresh_tokens(), refresh_secret).await {
            Ok(redeemed) => redeemed,
            Err(AuthError::ExpiredToken) => {
                // the expired row is consumed even though the refresh fails
                uow.commit().await?;
                return Err(AuthError::ExpiredToken);
            }
            Err(e) => return Err(e),
        };

        let access_token = self
            .access_tokens
            .issue(redeemed.user_id, self.access_token_ttl)?;
        let new_secret = refresh::generate_secret()?;
        refresh::rotate(
            uow.refresh_tokens(),
            &redeemed.row,
            &new_secret,
            refresh::expires_in(self.refresh_token_ttl)?,
        )
        .await?;

        uow.commit().await?;
        tracing::debug!(user_id = %redeemed.user_id, "Refresh token rotated");

        Ok(TokenPair {
            access_token,
            refresh_token: new_secret,
        })
    }

    /// Resolve an access token to the user it was issued for
    pub fn validate_access_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.access_tokens.parse(token)?;
        Ok(claims.user_id()?)
    }

    /// Spend one bcrypt verification so an unknown email takes as long to
    /// reject as a wrong password
    async fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
            .await;

        match dummy {
            Ok(hash) => {
                self.hasher.verify(Some(hash), password).await;
            }
            Err(e) => tracing::warn!(error = %e, "Could not prepare placeholder password hash"),
        }
    }
}
