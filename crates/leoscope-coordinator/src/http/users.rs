use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;

use leoscope_core::auth;
use leoscope_core::error::LeoError;
use leoscope_core::model::Role;
use leoscope_core::wire::{ModifyUserRequest, RegisterUserRequest, RegisterUserResponse};

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn register_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<Json<RegisterUserResponse>, AppError> {
    caller.require_role(Role::Admin)?;

    let user_id = uuid::Uuid::new_v4().to_string();
    let token = auth::generate_token_b64_urlsafe(32);
    let hash = auth::sha256_urlsafe_token(&token)?;

    leoscope_storage::users_repo::create_user(
        &state.db,
        &user_id,
        &req.name,
        req.role,
        req.team.as_deref(),
        &hash,
    )
    .await?;

    Ok(Json(RegisterUserResponse { user_id, token }))
}

pub async fn modify_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
    Json(req): Json<ModifyUserRequest>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Admin)?;

    let found = leoscope_storage::users_repo::modify_user(
        &state.db,
        &user_id,
        req.name.as_deref(),
        req.role,
        req.team.as_ref().map(|t| Some(t.as_str())),
    )
    .await?;
    if !found {
        return Err(LeoError::not_found("no such user").into());
    }
    Ok(StatusCode::OK)
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Admin)?;

    let found = leoscope_storage::users_repo::delete_user(&state.db, &user_id).await?;
    if !found {
        return Err(LeoError::not_found("no such user").into());
    }
    Ok(StatusCode::OK)
}
