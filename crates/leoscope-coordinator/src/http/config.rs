use axum::Json;
use axum::extract::State;
use axum::Extension;

use leoscope_core::error::LeoError;
use leoscope_core::model::Role;
use leoscope_core::wire::ConfigDoc;
use leoscope_storage::config_repo;

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn get_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ConfigDoc>, AppError> {
    caller.require_role(Role::User)?;

    let config = config_repo::get(&state.db)
        .await?
        .ok_or_else(|| LeoError::not_found("global config not yet set"))?;
    Ok(Json(ConfigDoc { doc: config.doc }))
}

pub async fn update_global_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ConfigDoc>,
) -> Result<Json<ConfigDoc>, AppError> {
    caller.require_role(Role::Admin)?;

    let config = config_repo::upsert(&state.db, req.doc).await?;
    Ok(Json(ConfigDoc { doc: config.doc }))
}
