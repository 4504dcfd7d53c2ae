use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Extension;
use time::OffsetDateTime;

use leoscope_core::error::LeoError;
use leoscope_core::model::{JobKind, Role};
use leoscope_core::wire::{
    JobsFilter, JobsResponse, RescheduleJobRequest, RescheduleJobResponse, ScheduleJobRequest,
    ScheduleJobResponse,
};
use leoscope_storage::jobs_repo;

use crate::auth::Caller;
use crate::error::AppError;
use crate::AppState;

pub async fn schedule_job(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<ScheduleJobRequest>,
) -> Result<Json<ScheduleJobResponse>, AppError> {
    caller.require_role(Role::User)?;
    if caller.id != req.job.owner_id {
        return Err(LeoError::forbidden("only the job owner may schedule it").into());
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    req.job.validate(now)?;

    state.admission.schedule_job(&state.db, req.job).await?;
    Ok(Json(ScheduleJobResponse::Success))
}

pub async fn reschedule_job_nearest(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<String>,
    Json(req): Json<RescheduleJobRequest>,
) -> Result<Json<RescheduleJobResponse>, AppError> {
    caller.require_role(Role::User)?;

    let job = jobs_repo::get_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| LeoError::not_found("no such job"))?;
    if caller.id != job.owner_id {
        return Err(LeoError::forbidden("only the job owner may reschedule it").into());
    }
    if job.kind() != JobKind::Atq {
        return Ok(Json(RescheduleJobResponse::Unsupported));
    }

    let start_ts = state
        .admission
        .reschedule_nearest(&state.db, &job, req.after_ts)
        .await?;
    Ok(Json(match start_ts {
        Some(start_ts) => RescheduleJobResponse::Rescheduled { start_ts },
        None => RescheduleJobResponse::NoSlot,
    }))
}

pub async fn get_jobs(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(filter): Query<JobsFilter>,
) -> Result<Json<JobsResponse>, AppError> {
    caller.require_role(Role::User)?;

    let jobs = match (filter.node_id.as_deref(), filter.owner_id.as_deref()) {
        (Some(node_id), _) => jobs_repo::get_jobs_by_node_id(&state.db, node_id).await?,
        (None, Some(owner_id)) => jobs_repo::get_jobs_by_owner_id(&state.db, owner_id).await?,
        (None, None) => jobs_repo::get_jobs_by_owner_id(&state.db, &caller.id).await?,
    };
    Ok(Json(JobsResponse { jobs }))
}

pub async fn get_job_by_id(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<String>,
) -> Result<Json<leoscope_core::model::Job>, AppError> {
    caller.require_role(Role::User)?;

    let job = jobs_repo::get_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| LeoError::not_found("no such job"))?;
    Ok(Json(job))
}

pub async fn delete_job_by_id(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(job_id): Path<String>,
) -> Result<StatusCode, AppError> {
    caller.require_role(Role::User)?;

    let job = jobs_repo::get_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| LeoError::not_found("no such job"))?;
    if caller.id != job.owner_id && caller.role != Role::Admin {
        return Err(LeoError::forbidden("only the owner or an admin may delete this job").into());
    }

    jobs_repo::delete_job(&state.db, &job_id).await?;
    Ok(StatusCode::OK)
}
