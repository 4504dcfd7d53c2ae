//! Command-line surface: top-level `Cli`, the two long-running server
//! subcommands (`coordinator run`, `agent run`), and the administrative
//! resource subcommands that go through [`crate::cli`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use leoscope_config::Config;

use crate::cli::config::ConfigCommand;
use crate::cli::job::JobCommand;
use crate::cli::node::NodeCommand;
use crate::cli::run::RunCommand;
use crate::cli::user::UserCommand;
use crate::cli::Connection;

#[derive(Debug, Parser)]
#[command(name = "leoscope", version, about = "LEO satellite testbed scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the coordinator HTTP service.
    Coordinator(CoordinatorArgs),
    /// Run a node agent against a coordinator.
    Agent(AgentArgs),
    /// Manage users.
    User {
        #[command(subcommand)]
        command: UserCommand,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Manage nodes.
    Node {
        #[command(subcommand)]
        command: NodeCommand,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Manage jobs.
    Job {
        #[command(subcommand)]
        command: JobCommand,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Inspect runs.
    Run {
        #[command(subcommand)]
        command: RunCommand,
        #[command(flatten)]
        conn: ConnArgs,
    },
    /// Read or replace the global config document.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
        #[command(flatten)]
        conn: ConnArgs,
    },
}

/// Shared by every administrative subcommand: where the coordinator lives
/// and which identity to call it as.
#[derive(Debug, Args)]
pub struct ConnArgs {
    #[arg(long, env = "LEOSCOPE_COORDINATOR_URL", default_value = "http://127.0.0.1:8701")]
    pub coordinator_url: String,
    #[arg(long, env = "LEOSCOPE_USER_ID")]
    pub user_id: String,
    #[arg(long, env = "LEOSCOPE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,
}

impl ConnArgs {
    pub fn into_connection(self) -> Result<Connection, anyhow::Error> {
        Ok(Connection {
            base_url: reqwest::Url::parse(&self.coordinator_url)?,
            user_id: self.user_id,
            access_token: self.access_token,
        })
    }
}

#[derive(Debug, Args, Clone)]
pub struct CoordinatorArgs {
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), env = "LEOSCOPE_HOST")]
    pub host: IpAddr,
    #[arg(long, default_value_t = 8701, env = "LEOSCOPE_PORT")]
    pub port: u16,
    #[arg(long, env = "LEOSCOPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, env = "LEOSCOPE_DEBUG_ERRORS")]
    pub debug_errors: bool,
    #[arg(long, env = "LEOSCOPE_SCHEDULER_TIMEZONE")]
    pub scheduler_timezone: Option<String>,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s", env = "LEOSCOPE_NODE_POLL_PERIOD")]
    pub node_poll_period: Duration,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", env = "LEOSCOPE_RPC_TIMEOUT")]
    pub rpc_timeout: Duration,
    #[arg(long, default_value_t = 5, env = "LEOSCOPE_RPC_RETRY_ATTEMPTS")]
    pub rpc_retry_attempts: u32,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s", env = "LEOSCOPE_CONTAINER_STOP_GRACE")]
    pub container_stop_grace: Duration,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", env = "LEOSCOPE_TASK_RENDEZVOUS_POLL")]
    pub task_rendezvous_poll: Duration,
    #[arg(long, default_value_t = 60, env = "LEOSCOPE_NODE_ACTIVE_THRES_SECS")]
    pub node_active_thres_s: i64,
    #[arg(long, default_value_t = 30, env = "LEOSCOPE_RUN_RETENTION_DAYS")]
    pub run_retention_days: i64,
}

impl CoordinatorArgs {
    pub fn into_config(self) -> Result<Config, anyhow::Error> {
        let data_dir = leoscope_config::data_dir::resolve_data_dir(self.data_dir)?;

        let scheduler_timezone = match self.scheduler_timezone {
            Some(tz) => {
                let trimmed = tz.trim();
                trimmed
                    .parse::<chrono_tz::Tz>()
                    .map_err(|_| anyhow::anyhow!("invalid scheduler_timezone: {trimmed}"))?;
                trimmed.to_string()
            }
            None => {
                let detected = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
                if detected.parse::<chrono_tz::Tz>().is_ok() {
                    detected
                } else {
                    "UTC".to_string()
                }
            }
        };

        let config = Config {
            bind: SocketAddr::new(self.host, self.port),
            data_dir,
            debug_errors: self.debug_errors,
            scheduler_timezone,
            node_poll_period: self.node_poll_period,
            rpc_timeout: self.rpc_timeout,
            rpc_retry_attempts: self.rpc_retry_attempts,
            container_stop_grace: self.container_stop_grace,
            task_rendezvous_poll: self.task_rendezvous_poll,
            node_active_thres_s: self.node_active_thres_s,
            run_retention_days: self.run_retention_days,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args, Clone)]
pub struct AgentArgs {
    #[arg(long, env = "LEOSCOPE_COORDINATOR_URL")]
    pub coordinator_url: String,
    #[arg(long, env = "LEOSCOPE_NODE_ID")]
    pub node_id: String,
    #[arg(long, env = "LEOSCOPE_NODE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,
    #[arg(long, env = "LEOSCOPE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s", env = "LEOSCOPE_NODE_POLL_PERIOD")]
    pub node_poll_period: Duration,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", env = "LEOSCOPE_RPC_TIMEOUT")]
    pub rpc_timeout: Duration,
    #[arg(long, default_value_t = 5, env = "LEOSCOPE_RPC_RETRY_ATTEMPTS")]
    pub rpc_retry_attempts: u32,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s", env = "LEOSCOPE_CONTAINER_STOP_GRACE")]
    pub container_stop_grace: Duration,
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5s", env = "LEOSCOPE_TASK_RENDEZVOUS_POLL")]
    pub task_rendezvous_poll: Duration,
}

impl AgentArgs {
    pub fn into_config(&self) -> Result<Config, anyhow::Error> {
        let data_dir = leoscope_config::data_dir::resolve_data_dir(self.data_dir.clone())?;
        let config = Config {
            bind: ([127, 0, 0, 1], 0).into(),
            data_dir,
            debug_errors: false,
            scheduler_timezone: "UTC".to_string(),
            node_poll_period: self.node_poll_period,
            rpc_timeout: self.rpc_timeout,
            rpc_retry_attempts: self.rpc_retry_attempts,
            container_stop_grace: self.container_stop_grace,
            task_rendezvous_poll: self.task_rendezvous_poll,
            node_active_thres_s: 60,
            run_retention_days: 30,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args, Clone)]
pub struct LoggingArgs {
    /// Logging filter (same syntax as RUST_LOG), e.g. `info`, `leoscope=debug,tower_http=warn`.
    #[arg(long, env = "LEOSCOPE_LOG")]
    pub log: Option<String>,
    /// Optional log file path. When set, logs go to both console and file.
    #[arg(long, env = "LEOSCOPE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
    #[arg(long, env = "LEOSCOPE_LOG_ROTATION", value_enum, default_value_t = LogRotation::Daily)]
    pub log_rotation: LogRotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}
