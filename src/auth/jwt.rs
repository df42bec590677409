//! JWT access tokens
//!
//! Access tokens are HS256 JWTs carrying only the user id. They are never
//! stored: a token is valid while its signature verifies and `exp` lies in
//! the future.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT-related errors
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Claims that carry an expiry
pub(crate) trait Expiring {
    fn expires_at(&self) -> i64;
}

/// JWT claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|e| TokenError::Invalid(e.to_string()))
    }
}

impl Expiring for Claims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// Sign claims with HS256
pub(crate) fn sign<C: Serialize>(claims: &C, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| TokenError::EncodingFailed(e.to_string()))
}

/// Verify signature and expiry. A token is expired from `exp` onwards, with
/// no leeway.
pub(crate) fn verify<C>(token: &str, key: &DecodingKey) -> Result<C, TokenError>
where
    C: DeserializeOwned + Expiring,
{
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let claims = decode::<C>(token, key, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid(e.to_string()),
        })?
        .claims;

    if claims.expires_at() <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

/// Unix expiry of a token issued at `now` for `ttl`
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<i64, TokenError> {
    now.checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| TokenError::EncodingFailed("token lifetime out of range".to_string()))
}

/// Issues and parses access tokens with one process-wide secret
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AccessTokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for `user_id` valid for `ttl` from now
    pub fn issue(&self, user_id: Uuid, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expiry(now, ttl)?,
        };

        sign(&claims, &self.encoding_key)
    }

    /// Verify and decode an access token
    pub fn parse(&self, token: &str) -> Result<Claims, TokenError> {
        verify(token, &self.decoding_key)
    }
}

impl std::fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCodec").finish_non_exhaustive()
    }
}
