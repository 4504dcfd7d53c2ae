use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;
use time::OffsetDateTime;

use leoscope_core::auth;
use leoscope_core::error::LeoError;
use leoscope_core::model::Role;
use leoscope_core::wire::{
    GetNodesFilter, GetNodesResponse, HeartbeatRequest, HeartbeatResponse, RegisterNodeRequest,
    RegisterNodeResponse,
};
use leoscope_storage::nodes_repo::{self, NodeUpdate, NodesFilter};

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn register_node(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<Json<RegisterNodeResponse>, AppError> {
    caller.require_role(Role::Admin)?;

    let token = auth::generate_token_b64_urlsafe(32);
    let hash = auth::sha256_urlsafe_token(&token)?;

    nodes_repo::register_node(
        &state.db,
        &req.node_id,
        &req.display_name,
        req.coords,
        &req.location,
        &req.provider,
        &hash,
    )
    .await?;

    Ok(Json(RegisterNodeResponse {
        node_id: req.node_id,
        token,
    }))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateNodeBody {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub coords: Option<leoscope_core::model::Coords>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub public_ip: Option<Option<String>>,
}

pub async fn update_node(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(node_id): Path<String>,
    Json(req): Json<UpdateNodeBody>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Admin)?;

    let found = nodes_repo::update_node(
        &state.db,
        &node_id,
        NodeUpdate {
            display_name: req.display_name.as_deref(),
            coords: req.coords,
            location: req.location.as_deref(),
            provider: req.provider.as_deref(),
            public_ip: req.public_ip.as_ref().map(|ip| ip.as_deref()),
        },
    )
    .await?;
    if !found {
        return Err(LeoError::not_found("no such node").into());
    }
    Ok(StatusCode::OK)
}

pub async fn delete_node(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(node_id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Admin)?;

    let found = nodes_repo::delete_node(&state.db, &node_id).await?;
    if !found {
        return Err(LeoError::not_found("no such node").into());
    }
    Ok(StatusCode::OK)
}

pub async fn get_nodes(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<GetNodesFilter>,
) -> Result<Json<GetNodesResponse>, AppError> {
    caller.require_role(Role::User)?;

    let active_since_ts = if filter.active == Some(true) {
        let thres = filter
            .active_thres_s
            .unwrap_or(state.config.node_active_thres_s);
        Some(OffsetDateTime::now_utc().unix_timestamp() - thres)
    } else {
        None
    };

    let nodes = nodes_repo::get_nodes(
        &state.db,
        NodesFilter {
            node_id: filter.node_id.as_deref(),
            location: filter.location.as_deref(),
            active_since_ts,
        },
    )
    .await?;
    Ok(Json(GetNodesResponse { nodes }))
}

pub async fn report_heartbeat(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(node_id): Path<String>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, AppError> {
    caller.require_role(Role::Node)?;
    if caller.id != node_id || caller.id != req.node_id {
        return Err(LeoError::forbidden("a node may only heartbeat for itself").into());
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let received = nodes_repo::touch_heartbeat(&state.db, &node_id, now).await?;
    Ok(Json(HeartbeatResponse { received }))
}
