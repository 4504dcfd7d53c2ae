use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Extension;
use time::OffsetDateTime;

use leoscope_core::error::LeoError;
use leoscope_core::model::{Role, Task};
use leoscope_core::wire::{ScheduleTaskRequest, TasksFilter, TasksResponse, UpdateTaskRequest};
use leoscope_storage::tasks_repo;

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn schedule_task(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ScheduleTaskRequest>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Node)?;

    let task = Task {
        id: req.task_id,
        run_id: req.run_id,
        job_id: req.job_id,
        node_id: req.node_id,
        kind: req.kind,
        status: leoscope_core::model::TaskStatus::Pending,
        ttl_secs: req.ttl_secs,
        created_ts: OffsetDateTime::now_utc().unix_timestamp(),
    };
    tasks_repo::schedule_task(&state.db, &task).await?;
    Ok(StatusCode::OK)
}

pub async fn get_tasks(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<TasksFilter>,
) -> Result<Json<TasksResponse>, AppError> {
    caller.require_role(Role::Node)?;

    let tasks = tasks_repo::get_tasks(
        &state.db,
        tasks_repo::TasksFilter {
            task_id: filter.task_id.as_deref(),
            node_id: filter.node_id.as_deref(),
            run_id: filter.run_id.as_deref(),
        },
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .await?;
    Ok(Json(TasksResponse { tasks }))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::Node)?;

    let found = tasks_repo::update_task_status(&state.db, &req.task_id, req.status).await?;
    if !found {
        return Err(LeoError::not_found("no such task").into());
    }
    Ok(StatusCode::OK)
}
