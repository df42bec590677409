//! Fleet Pulse users service
//!
//! Account registration, invite-based activation, and session management
//! with short-lived access tokens and rotating refresh tokens.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod users;
