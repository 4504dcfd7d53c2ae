use axum::Json;
use axum::extract::{Path, State};
use axum::Extension;

use leoscope_core::error::LeoError;
use leoscope_core::model::Role;
use leoscope_core::wire::ScavengerState;
use leoscope_storage::nodes_repo;

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct SetScavengerBody {
    pub active: bool,
}

pub async fn set_scavenger(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(node_id): Path<String>,
    Json(req): Json<SetScavengerBody>,
) -> Result<Json<ScavengerState>, AppError> {
    caller.require_role(Role::Admin)?;

    let found = nodes_repo::set_scavenger(&state.db, &node_id, req.active).await?;
    if !found {
        return Err(LeoError::not_found("no such node").into());
    }
    Ok(Json(ScavengerState {
        node_id,
        active: req.active,
    }))
}

pub async fn get_scavenger(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(node_id): Path<String>,
) -> Result<Json<ScavengerState>, AppError> {
    caller.require_role(Role::Node)?;

    let active = nodes_repo::get_scavenger(&state.db, &node_id)
        .await?
        .ok_or_else(|| LeoError::not_found("no such node"))?;
    Ok(Json(ScavengerState { node_id, active }))
}
