//! Route definitions for the users API

mod auth;
mod users;

use axum::{middleware, routing::get, Router};

use crate::db::Store;
use crate::handlers::health;
use crate::state::AppState;

pub use auth::auth_routes;
pub use users::user_routes;

/// Assemble the full API: versioned routes under `/v1`, health endpoints at the root
pub fn build_router<S: Store>(state: AppState<S>) -> Router {
    let api = Router::new().merge(auth_routes()).merge(user_routes());

    Router::new()
        .nest("/v1", api)
        .route("/health", get(health::health_check::<S>))
        .route("/ready", get(health::readiness_check::<S>))
        .route("/live", get(health::liveness_check))
        .with_state(state)
        .layer(middleware::from_fn(crate::middleware::request_tracing))
}
