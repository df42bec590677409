//! Authentication routes

use axum::{routing::post, Router};

use crate::db::Store;
use crate::handlers::auth;
use crate::state::AppState;

/// Create authentication routes
pub fn auth_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/login", post(auth::login::<S>))
        .route("/refresh", post(auth::refresh_token::<S>))
}
