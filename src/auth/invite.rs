//! Invite tokens
//!
//! An invite is a signed, time-bounded permission to set a user's password.
//! It is signed with its own secret and carries a fingerprint of the user's
//! password hash at issue time, so it stops verifying against the account
//! as soon as the password changes.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::jwt::{expiry, sign, verify, Expiring, TokenError};
use crate::models::User;

/// Claims carried by an invite token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct InviteClaims {
    /// Invited user ID
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
    /// Password-state fingerprint at issue time
    pub pwd: String,
}

impl InviteClaims {
    /// Whether the invite was issued against the user's current password state
    pub fn matches(&self, user: &User) -> bool {
        user.id == self.sub && password_fingerprint(user.password_hash.as_deref()) == self.pwd
    }
}

impl Expiring for InviteClaims {
    fn expires_at(&self) -> i64 {
        self.exp
    }
}

/// SHA-256 over the stored hash, or over nothing for a pending account
pub fn password_fingerprint(password_hash: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password_hash.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

pub struct InviteTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl InviteTokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issue an invite addressed to `user`
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = InviteClaims {
            sub: user.id,
            iat: now.timestamp(),
            exp: expiry(now, self.ttl)?,
            pwd: password_fingerprint(user.password_hash.as_deref()),
        };

        sign(&claims, &self.encoding_key)
    }

    /// Verify and decode an invite token
    pub fn parse(&self, token: &str) -> Result<InviteClaims, TokenError> {
        verify(token, &self.decoding_key)
    }
}

impl std::fmt::Debug for InviteTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InviteTokenCodec")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
