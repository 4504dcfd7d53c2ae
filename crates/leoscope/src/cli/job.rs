//! `leoscope job` — schedule, reschedule, list, fetch, and delete jobs.
//! `schedule` is the one subcommand that assembles a full domain object
//! client-side; everything else is a thin pass-through to the coordinator.

use clap::{Args, Subcommand, ValueEnum};
use reqwest::Method;

use leoscope_core::model::{Job, JobParams, JobSchedule, Validity};
use leoscope_core::wire::{
    JobsFilter, JobsResponse, RescheduleJobRequest, RescheduleJobResponse, ScheduleJobRequest,
    ScheduleJobResponse,
};

use super::{call, print_json, CliError, Connection};

#[derive(Debug, Subcommand)]
pub enum JobCommand {
    Schedule(ScheduleArgs),
    Reschedule(RescheduleArgs),
    Get(GetArgs),
    Delete(IdArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ScheduleKind {
    Cron,
    Atq,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    #[arg(long)]
    pub job_id: String,
    #[arg(long)]
    pub node_id: String,
    #[arg(long)]
    pub owner_id: String,
    #[arg(long, value_enum)]
    pub schedule_kind: ScheduleKind,
    /// Required when `--schedule-kind cron`.
    #[arg(long)]
    pub cron_expr: Option<String>,
    /// Required when `--schedule-kind atq`.
    #[arg(long)]
    pub at_ts: Option<i64>,
    #[arg(long)]
    pub start_ts: i64,
    #[arg(long)]
    pub end_ts: i64,
    #[arg(long)]
    pub length_secs: u64,
    #[arg(long, default_value_t = false)]
    pub overhead: bool,
    #[arg(long)]
    pub paired_server_node_id: Option<String>,
    #[arg(long)]
    pub trigger: Option<String>,
    /// Opaque per-job config blob handed to the container as-is.
    #[arg(long, default_value = "")]
    pub config: String,
    #[arg(long)]
    pub mode: Option<String>,
    #[arg(long)]
    pub deploy: Option<String>,
    #[arg(long)]
    pub execute: Option<String>,
    #[arg(long)]
    pub finish: Option<String>,
}

#[derive(Debug, Args)]
pub struct RescheduleArgs {
    #[arg(long)]
    pub job_id: String,
    #[arg(long)]
    pub after_ts: i64,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    #[arg(long)]
    pub job_id: Option<String>,
    #[arg(long)]
    pub node_id: Option<String>,
    #[arg(long)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(long)]
    pub job_id: String,
}

pub async fn run(conn: &Connection, cmd: JobCommand) -> Result<(), CliError> {
    match cmd {
        JobCommand::Schedule(args) => {
            let schedule = match args.schedule_kind {
                ScheduleKind::Cron => {
                    let expr = args.cron_expr.ok_or_else(|| {
                        CliError::BadInput("--cron-expr is required for --schedule-kind cron".into())
                    })?;
                    JobSchedule::Cron { expr }
                }
                ScheduleKind::Atq => {
                    let at_ts = args.at_ts.ok_or_else(|| {
                        CliError::BadInput("--at-ts is required for --schedule-kind atq".into())
                    })?;
                    JobSchedule::Atq { at_ts }
                }
            };

            let job = Job {
                id: args.job_id,
                node_id: args.node_id,
                owner_id: args.owner_id,
                schedule,
                validity: Validity {
                    start_ts: args.start_ts,
                    end_ts: args.end_ts,
                },
                length_secs: args.length_secs,
                overhead: args.overhead,
                paired_server_node_id: args.paired_server_node_id,
                trigger: args.trigger,
                config: args.config,
                params: JobParams {
                    mode: args.mode,
                    deploy: args.deploy,
                    execute: args.execute,
                    finish: args.finish,
                },
            };
            let body = ScheduleJobRequest { job };
            let resp: ScheduleJobResponse =
                call(conn, Method::POST, "api/jobs", None::<&()>, Some(&body)).await?;
            match &resp {
                ScheduleJobResponse::Success => print_json(&resp),
                ScheduleJobResponse::Conflict { .. } | ScheduleJobResponse::Invalid { .. } => {
                    print_json(&resp);
                    return Err(CliError::Domain("job was not admitted".into()));
                }
            }
        }
        JobCommand::Reschedule(args) => {
            let body = RescheduleJobRequest {
                job_id: args.job_id.clone(),
                after_ts: args.after_ts,
            };
            let path = format!("api/jobs/{}/reschedule", args.job_id);
            let resp: RescheduleJobResponse =
                call(conn, Method::POST, &path, None::<&()>, Some(&body)).await?;
            print_json(&resp);
        }
        JobCommand::Get(args) => {
            let filter = JobsFilter {
                node_id: args.node_id,
                owner_id: args.owner_id,
            };
            if let Some(job_id) = args.job_id {
                let path = format!("api/jobs/{job_id}");
                let job: Job = call(conn, Method::GET, &path, None::<&()>, None::<&()>).await?;
                print_json(&job);
            } else {
                let resp: JobsResponse =
                    call(conn, Method::GET, "api/jobs", Some(&filter), None::<&()>).await?;
                print_json(&resp.jobs);
            }
        }
        JobCommand::Delete(args) => {
            let path = format!("api/jobs/{}", args.job_id);
            let _: serde_json::Value =
                call(conn, Method::DELETE, &path, None::<&()>, None::<&()>).await?;
        }
    }
    Ok(())
}
