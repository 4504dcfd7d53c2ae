use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub mod data_dir;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub debug_errors: bool,
    pub scheduler_timezone: String,
    /// How often a node pulls its admitted job set and re-evaluates its
    /// local timers.
    pub node_poll_period: Duration,
    pub rpc_timeout: Duration,
    pub rpc_retry_attempts: u32,
    /// Wall-clock grace given to a container after a stop signal before
    /// the executor treats it as wedged.
    pub container_stop_grace: Duration,
    pub task_rendezvous_poll: Duration,
    /// A node is considered active if its last heartbeat is within this
    /// many seconds, used as `get_nodes`'s default `active_thres_s`.
    pub node_active_thres_s: i64,
    pub run_retention_days: i64,
}

impl Config {
    /// A config with sane defaults for integration tests, rooted at a
    /// caller-supplied scratch directory (typically a `TempDir`).
    pub fn for_tests(data_dir: &std::path::Path) -> Self {
        Self {
            bind: ([127, 0, 0, 1], 0).into(),
            data_dir: data_dir.to_path_buf(),
            debug_errors: true,
            scheduler_timezone: "UTC".to_string(),
            node_poll_period: Duration::from_secs(5),
            rpc_timeout: Duration::from_secs(5),
            rpc_retry_attempts: 5,
            container_stop_grace: Duration::from_secs(10),
            task_rendezvous_poll: Duration::from_secs(1),
            node_active_thres_s: 60,
            run_retention_days: 30,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.rpc_retry_attempts == 0 {
            anyhow::bail!("rpc_retry_attempts must be >= 1");
        }
        if self.node_active_thres_s <= 0 {
            anyhow::bail!("node_active_thres_s must be > 0");
        }
        if self.run_retention_days <= 0 {
            anyhow::bail!("run_retention_days must be > 0");
        }
        self.scheduler_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("invalid scheduler_timezone: {}", self.scheduler_timezone))?;
        Ok(())
    }
}
