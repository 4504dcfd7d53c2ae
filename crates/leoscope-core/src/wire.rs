//! Request/response DTOs for the logical RPC surface. Shared between
//! the coordinator's axum handlers and the node agent's `reqwest`
//! client so the two sides can never drift out of sync on wire shape.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::model::{Coords, Job, Node, Role, Run, RunStatus, Task, TaskKind, TaskStatus};

/// The body returned for any non-OK RPC outcome. HTTP status is derived
/// from `code` (`ErrorCode::http_status`) at the transport edge.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&crate::error::LeoError> for ErrorBody {
    fn from(e: &crate::error::LeoError) -> Self {
        Self {
            code: e.code,
            message: e.message.clone(),
            details: e.details.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterUserResponse {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ModifyUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub team: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeRequest {
    pub node_id: String,
    pub display_name: String,
    pub coords: Coords,
    pub location: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterNodeResponse {
    pub node_id: String,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GetNodesFilter {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub active_thres_s: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetNodesResponse {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub received: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleJobRequest {
    pub job: Job,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleJobResponse {
    Success,
    Conflict {
        offending_job_id: String,
        instant: i64,
    },
    Invalid {
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RescheduleJobRequest {
    pub job_id: String,
    pub after_ts: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescheduleJobResponse {
    Rescheduled { start_ts: i64 },
    NoSlot,
    Unsupported,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct JobsFilter {
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobsResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateRunRequest {
    pub run_id: String,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub end_ts: Option<i64>,
    /// Only consulted when `run_id` does not exist yet: the executor's
    /// first `update_run` call for a freshly-detected firing doubles as
    /// the run's creation, since no separate `create_run` RPC exists.
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub start_ts: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RunsFilter {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunsResponse {
    pub runs: Vec<Run>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleTaskRequest {
    pub task_id: String,
    pub run_id: String,
    pub job_id: String,
    pub node_id: String,
    pub kind: TaskKind,
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TasksFilter {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TasksResponse {
    pub tasks: Vec<Task>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScavengerRequest {
    pub node_id: String,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScavengerState {
    pub node_id: String,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigDoc {
    pub doc: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelAccessRequest {
    pub target_user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelAccessResponse {
    Allow,
    Deny,
}
