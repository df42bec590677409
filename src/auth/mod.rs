//! Authentication module
//!
//! - Password hashing (bcrypt)
//! - JWT access tokens and invite tokens, each with its own secret
//! - Opaque refresh tokens stored by digest and rotated on every use

mod error;
pub mod invite;
pub mod jwt;
mod password;
pub mod refresh;
mod service;

pub use error::AuthError;
pub use invite::{InviteClaims, InviteTokenCodec};
pub use jwt::{AccessTokenCodec, Claims, TokenError};
pub use password::{PasswordHasher, MAX_HASH_COST, MIN_HASH_COST};
pub use service::AuthService;
