//! User HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::db::Store;
use crate::error::ApiError;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    AcceptInviteRequest, CreateUserRequest, NewUser, SearchUsersRequest, UserResponse,
};
use crate::state::AppState;

/// POST /v1/users - Register a user and send the invite
pub async fn register_user<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let user = state
        .user_service
        .register(NewUser {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            password: req.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /v1/users/current - The authenticated caller
pub async fn get_current_user<S: Store>(
    State(state): State<AppState<S>>,
    caller: AuthenticatedUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.user_service.get_user(caller.user_id).await?;

    Ok(Json(user.into()))
}

/// POST /v1/users/invite/accept - Set the password from an invite
pub async fn accept_invite<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<AcceptInviteRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let user = state
        .user_service
        .accept_invite(&req.token, &req.password)
        .await?;

    Ok(Json(user.into()))
}

/// POST /v1/internal/users/search - Look up users by id
pub async fn search_users<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<SearchUsersRequest>, JsonRejection>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let Json(req) = payload?;

    let users = state.user_service.search_users(&req.user_ids).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}
