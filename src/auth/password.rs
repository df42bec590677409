//! Password hashing
//!
//! bcrypt runs on the blocking pool so a slow hash never stalls the runtime.

use super::AuthError;

/// Lowest work factor bcrypt accepts
pub const MIN_HASH_COST: u32 = 4;

/// Highest work factor bcrypt accepts
pub const MAX_HASH_COST: u32 = 31;

/// Salted, adaptive password hasher
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a plaintext password
    pub async fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;

        tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost))
            .await
            .map_err(|e| AuthError::CryptoFailure(e.to_string()))?
            .map_err(|e| AuthError::CryptoFailure(e.to_string()))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// Never fails: a missing or malformed hash is simply a mismatch.
    pub async fn verify(&self, hash: Option<&str>, plaintext: &str) -> bool {
        let Some(hash) = hash else {
            return false;
        };
        let hash = hash.to_owned();
        let plaintext = plaintext.to_owned();

        match tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Stored password hash could not be parsed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Password verification task failed");
                false
            }
        }
    }
}
