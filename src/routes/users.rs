//! User route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::db::Store;
use crate::handlers::users;
use crate::state::AppState;

pub fn user_routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/users", post(users::register_user::<S>))
        .route("/users/current", get(users::get_current_user::<S>))
        .route("/users/invite/accept", post(users::accept_invite::<S>))
        .route("/internal/users/search", post(users::search_users::<S>))
}
