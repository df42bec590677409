//! Authentication middleware
//!
//! Extractor that resolves a bearer access token to the calling user.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::db::Store;
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated user extracted from the access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

/// Extractor for authenticated users
///
/// Only the token's signature and expiry are checked; access tokens are not
/// looked up in the store.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Hello, user {}", user.user_id)
/// }
/// ```
#[async_trait]
impl<S: Store> FromRequestParts<AppState<S>> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthorized("Authorization header with Bearer token required".into())
                        .into_response()
                })?;

        let user_id = state
            .auth_service
            .validate_access_token(bearer.token())
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                ApiError::Forbidden("invalid token".into()).into_response()
            })?;

        Ok(AuthenticatedUser { user_id })
    }
}
