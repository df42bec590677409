//! Refresh tokens
//!
//! A refresh secret is random, opaque and shown to the client exactly once.
//! Only its SHA-256 digest is stored. Redeeming a secret either rotates the
//! row to a new digest or, when expired, deletes it, so every secret works
//! at most once.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::AuthError;
use crate::db::RefreshTokenRepository;
use crate::models::RefreshToken;

/// Bytes of OS randomness per secret (512 bits)
pub const REFRESH_SECRET_BYTES: usize = 64;

/// A redeemed refresh token: its owner and the locked row
#[derive(Debug, Clone)]
pub struct Redeemed {
    pub user_id: Uuid,
    pub row: RefreshToken,
}

/// Generate a new URL-safe refresh secret
pub fn generate_secret() -> Result<String, AuthError> {
    let mut bytes = [0u8; REFRESH_SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::CryptoFailure(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a secret for storage
pub fn digest(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Expiry instant `ttl` from now
pub fn expires_in(ttl: Duration) -> Result<DateTime<Utc>, AuthError> {
    Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AuthError::CryptoFailure("refresh token lifetime out of range".to_string()))
}

/// Replace every refresh token of `user_id` with a fresh one and return its
/// raw secret
pub async fn issue_for(
    repo: &mut dyn RefreshTokenRepository,
    user_id: Uuid,
    ttl: Duration,
) -> Result<String, AuthError> {
    let secret = generate_secret()?;
    let expires_at = expires_in(ttl)?;

    let purged = repo.delete_for_user(user_id).await?;
    if purged > 0 {
        tracing::debug!(user_id = %user_id, purged, "Superseded previous refresh tokens");
    }

    repo.create(RefreshToken::new(user_id, digest(&secret), expires_at))
        .await?;

    Ok(secret)
}

/// Look up the row for a raw secret. An expired row is deleted before
/// `ExpiredToken` is returned.
pub async fn redeem(
    repo: &mut dyn RefreshTokenRepository,
    secret: &str,
) -> Result<Redeemed, AuthError> {
    let row = repo
        .find_by_digest(&digest(secret))
        .await?
        .ok_or(AuthError::InvalidToken)?;

    if row.is_expired(Utc::now()) {
        repo.delete(row.id).await?;
        tracing::info!(user_id = %row.user_id, "Expired refresh token presented and removed");
        return Err(AuthError::ExpiredToken);
    }

    Ok(Redeemed {
        user_id: row.user_id,
        row,
    })
}

/// Overwrite the redeemed row with a new secret, and drop any other rows of
/// the same user
pub async fn rotate(
    repo: &mut dyn RefreshTokenRepository,
    row: &RefreshToken,
    new_secret: &str,
    new_expires_at: DateTime<Utc>,
) -> Result<(), AuthError> {
    let swapped = repo
        .swap_digest(row.id, &row.token_digest, &digest(new_secret), new_expires_at)
        .await?;
    if !swapped {
        return Err(AuthError::InvalidToken);
    }

    repo.delete_others_for_user(row.user_id, row.id).await?;

    Ok(())
}
