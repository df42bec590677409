//! Authentication HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::auth::AuthError;
use crate::db::Store;
use crate::error::ApiError;
use crate::models::{LoginRequest, LoginResponse, RefreshTokenRequest};
use crate::state::AppState;

/// POST /v1/login - Verify credentials and issue an access/refresh pair
pub async fn login<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoginResponse>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let tokens = state
        .auth_service
        .login(&req.email, &req.password)
        .await
        .map_err(|e| match e {
            // do not disclose whether the email is registered
            AuthError::UserNotFound => ApiError::from(AuthError::InvalidCredentials),
            other => ApiError::from(other),
        })?;

    Ok((StatusCode::CREATED, Json(tokens.into())))
}

/// POST /v1/refresh - Rotate a refresh token
pub async fn refresh_token<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let tokens = state.auth_service.refresh(&req.refresh_token).await?;

    Ok(Json(tokens.into()))
}
