//! Tagged, strongly-typed records for every persisted entity, replacing
//! loosely-typed dicts at the RPC boundary with types the compiler
//! checks.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    NodePriv,
    UserPriv,
    Node,
    User,
}

impl Role {
    /// Does `self` meet a minimum role requirement pinned at `required`?
    pub fn satisfies(self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Node => 1,
            Role::UserPriv => 2,
            Role::NodePriv => 2,
            Role::Admin => 3,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "NODE_PRIV" => Ok(Role::NodePriv),
            "USER_PRIV" => Ok(Role::UserPriv),
            "NODE" => Ok(Role::Node),
            "USER" => Ok(Role::User),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Admin => "ADMIN",
            Role::NodePriv => "NODE_PRIV",
            Role::UserPriv => "USER_PRIV",
            Role::Node => "NODE",
            Role::User => "USER",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub team: Option<String>,
    /// SHA-256 digest of the static bearer token; the plaintext is
    /// returned to the caller exactly once, at creation.
    pub static_token_hash: Vec<u8>,
    pub signed_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub display_name: String,
    pub coords: Coords,
    pub location: String,
    pub provider: String,
    pub last_active_ts: i64,
    pub public_ip: Option<String>,
    pub scavenger_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    Cron,
    Atq,
}

/// A job's timing source, modeled as a tagged union so a CRON job can
/// never be constructed without a cron string nor an ATQ job without a
/// firing instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobSchedule {
    Cron { expr: String },
    Atq { at_ts: i64 },
}

impl JobSchedule {
    pub fn kind(&self) -> JobKind {
        match self {
            JobSchedule::Cron { .. } => JobKind::Cron,
            JobSchedule::Atq { .. } => JobKind::Atq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Validity {
    pub start_ts: i64,
    pub end_ts: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub deploy: Option<String>,
    #[serde(default)]
    pub execute: Option<String>,
    #[serde(default)]
    pub finish: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub node_id: String,
    pub owner_id: String,
    pub schedule: JobSchedule,
    pub validity: Validity,
    pub length_secs: u64,
    pub overhead: bool,
    pub paired_server_node_id: Option<String>,
    pub trigger: Option<String>,
    pub config: String,
    pub params: JobParams,
}

impl Job {
    pub fn kind(&self) -> JobKind {
        self.schedule.kind()
    }

    /// Nodes whose occupancy this job can conflict on.
    pub fn conflict_node_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.node_id.as_str()];
        if let Some(peer) = self.paired_server_node_id.as_deref() {
            ids.push(peer);
        }
        ids
    }

    pub fn touches_node(&self, node_id: &str) -> bool {
        self.node_id == node_id || self.paired_server_node_id.as_deref() == Some(node_id)
    }

    /// Structural validation independent of the admitted set: cron syntax,
    /// trigger syntax, `length_secs >= 1`, and (for ATQ) that `start_ts`
    /// is not already in the past.
    pub fn validate(&self, now_ts: i64) -> Result<(), crate::error::LeoError> {
        use crate::error::LeoError;

        if self.length_secs < 1 {
            return Err(LeoError::invalid("length_secs must be >= 1"));
        }
        if self.validity.start_ts >= self.validity.end_ts {
            return Err(LeoError::invalid("validity.start_ts must be < end_ts"));
        }

        match &self.schedule {
            JobSchedule::Cron { expr } => {
                crate::schedule::parse_cron(expr)
                    .map_err(|e| LeoError::invalid(format!("invalid cron expression: {e}")))?;
            }
            JobSchedule::Atq { at_ts } => {
                if *at_ts < now_ts {
                    return Err(LeoError::invalid("atq start_ts is already in the past"));
                }
            }
        }

        if let Some(expr) = self.trigger.as_deref() {
            crate::trigger::verify_trigger(expr)
                .map_err(|e| LeoError::invalid(format!("invalid trigger expression: {e}")))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Scheduled,
    Deploying,
    Running,
    Uploading,
    Completed,
    Failed,
    Aborted,
    Skipped,
}

impl RunStatus {
    /// Forward-only DAG edges. `to` is reachable from `self` in exactly
    /// one step, or `self == to` (idempotent no-op update).
    pub fn can_transition_to(self, to: RunStatus) -> bool {
        use RunStatus::*;
        if self == to {
            return true;
        }
        matches!(
            (self, to),
            (Scheduled, Deploying)
                | (Scheduled, Skipped)
                | (Scheduled, Aborted)
                | (Deploying, Running)
                | (Deploying, Skipped)
                | (Deploying, Failed)
                | (Deploying, Aborted)
                | (Running, Uploading)
                | (Running, Failed)
                | (Running, Aborted)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Uploading, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Aborted | RunStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub job_id: String,
    pub node_id: String,
    pub owner_id: String,
    pub status: RunStatus,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
    pub status_message: String,
    pub artifact_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    ServerSetup,
    Custom { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub run_id: String,
    pub job_id: String,
    pub node_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub ttl_secs: u64,
    pub created_ts: i64,
}

impl Task {
    pub fn is_dead(&self, now_ts: i64) -> bool {
        self.created_ts + self.ttl_secs as i64 < now_ts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub doc: serde_json::Value,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_satisfies_is_a_minimum_bar_not_equality() {
        assert!(Role::Admin.satisfies(Role::User));
        assert!(!Role::User.satisfies(Role::Admin));
        assert!(Role::NodePriv.satisfies(Role::UserPriv));
    }

    #[test]
    fn run_status_rejects_backward_transitions() {
        assert!(RunStatus::Deploying.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Deploying));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn run_status_same_status_update_is_idempotent() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn job_validate_rejects_past_atq_start() {
        let job = Job {
            id: "j".into(),
            node_id: "n1".into(),
            owner_id: "u1".into(),
            schedule: JobSchedule::Atq { at_ts: 100 },
            validity: Validity {
                start_ts: 100,
                end_ts: 200,
            },
            length_secs: 10,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        };
        let err = job.validate(150).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::Invalid);
    }
}
