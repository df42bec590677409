//! API handlers for the users service

pub mod auth;
pub mod health;
pub mod users;

// Re-export AuthenticatedUser from middleware for handler use
pub use crate::middleware::auth::AuthenticatedUser;
