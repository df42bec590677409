//! Application state shared across handlers

use std::sync::Arc;

use crate::auth::AuthService;
use crate::db::Store;
use crate::users::UserService;

/// Shared application state
#[derive(Clone)]
pub struct AppState<S: Store> {
    pub auth_service: Arc<AuthService<S>>,
    pub user_service: Arc<UserService<S>>,
    pub store: S,
}

impl<S: Store> AppState<S> {
    pub fn new(
        auth_service: Arc<AuthService<S>>,
        user_service: Arc<UserService<S>>,
        store: S,
    ) -> Self {
        Self {
            auth_service,
            user_service,
            store,
        }
    }
}
