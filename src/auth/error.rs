use thiserror::Error;

use super::jwt::TokenError;
use crate::db::StoreError;

/// Authentication and activation errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user not found")]
    UserNotFound,

    #[error("user with such email already exists")]
    EmailAlreadyExists,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid invitation")]
    InvalidInvite,

    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::EncodingFailed(msg) => AuthError::CryptoFailure(msg),
            TokenError::Expired | TokenError::Invalid(_) => AuthError::InvalidToken,
        }
    }
}
