use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;

use leoscope_core::error::LeoError;
use leoscope_core::model::Role;
use leoscope_core::wire::{RunsFilter, RunsResponse, UpdateRunRequest};
use leoscope_storage::runs_repo::{self, RunUpdate};

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn update_run(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(run_id): Path<String>,
    Json(req): Json<UpdateRunRequest>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Node)?;

    // There is no separate create-run RPC: a node's first `update_run`
    // call for a freshly-detected firing doubles as the run's creation,
    // provided it supplies job_id/node_id/owner_id/start_ts. Later calls
    // for the same run_id only need to carry the transition.
    match runs_repo::get_run(&state.db, &run_id).await? {
        Some(run) if caller.id != run.node_id => {
            return Err(LeoError::forbidden("only the owning node may update this run").into());
        }
        Some(_) => {}
        None => {
            if req.node_id.as_deref() != Some(caller.id.as_str()) {
                return Err(LeoError::forbidden("only the owning node may create this run").into());
            }
        }
    }

    let ok = runs_repo::update_run(
        &state.db,
        &run_id,
        RunUpdate {
            status: req.status,
            status_message: req.status_message,
            artifact_url: req.artifact_url,
            end_ts: req.end_ts,
            job_id: req.job_id,
            node_id: req.node_id,
            owner_id: req.owner_id,
            start_ts: req.start_ts,
        },
    )
    .await?;
    if !ok {
        return Err(LeoError::invalid("illegal run status transition").into());
    }
    Ok(StatusCode::OK)
}

pub async fn get_runs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<RunsFilter>,
) -> Result<Json<RunsResponse>, AppError> {
    caller.require_role(Role::User)?;

    let runs = runs_repo::get_runs(
        &state.db,
        runs_repo::RunsFilter {
            job_id: filter.job_id.as_deref(),
            node_id: filter.node_id.as_deref(),
            owner_id: filter.owner_id.as_deref(),
            status: filter.status,
        },
    )
    .await?;
    Ok(Json(RunsResponse { runs }))
}

#[derive(Debug, serde::Deserialize)]
pub struct ScheduledRunsQuery {
    pub node_id: String,
}

pub async fn get_scheduled_runs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(q): Query<ScheduledRunsQuery>,
) -> Result<Json<RunsResponse>, AppError> {
    caller.require_role(Role::User)?;

    let runs = runs_repo::get_scheduled_runs(&state.db, &q.node_id).await?;
    Ok(Json(RunsResponse { runs }))
}
