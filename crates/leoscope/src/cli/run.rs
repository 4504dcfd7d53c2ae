//! `leoscope run` — read-only: list runs by job/node/owner/status, or list
//! what's currently scheduled on a node. Runs are only ever mutated by the
//! node agent that owns them, never by this CLI.

use clap::{Args, Subcommand};
use reqwest::Method;

use leoscope_core::model::RunStatus;
use leoscope_core::wire::{RunsFilter, RunsResponse};

use super::{call, print_json, CliError, Connection};

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    Get(GetArgs),
    GetScheduled(GetScheduledArgs),
}

#[derive(Debug, Args)]
pub struct GetArgs {
    #[arg(long)]
    pub job_id: Option<String>,
    #[arg(long)]
    pub node_id: Option<String>,
    #[arg(long)]
    pub owner_id: Option<String>,
    /// One of SCHEDULED, DEPLOYING, RUNNING, UPLOADING, COMPLETED, FAILED,
    /// ABORTED, SKIPPED.
    #[arg(long)]
    pub status: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetScheduledArgs {
    #[arg(long)]
    pub node_id: String,
}

fn parse_status(s: &str) -> Result<RunStatus, CliError> {
    match s.to_ascii_uppercase().as_str() {
        "SCHEDULED" => Ok(RunStatus::Scheduled),
        "DEPLOYING" => Ok(RunStatus::Deploying),
        "RUNNING" => Ok(RunStatus::Running),
        "UPLOADING" => Ok(RunStatus::Uploading),
        "COMPLETED" => Ok(RunStatus::Completed),
        "FAILED" => Ok(RunStatus::Failed),
        "ABORTED" => Ok(RunStatus::Aborted),
        "SKIPPED" => Ok(RunStatus::Skipped),
        other => Err(CliError::BadInput(format!("unknown run status: {other}"))),
    }
}

pub async fn run(conn: &Connection, cmd: RunCommand) -> Result<(), CliError> {
    match cmd {
        RunCommand::Get(args) => {
            let status = args.status.as_deref().map(parse_status).transpose()?;
            let filter = RunsFilter {
                job_id: args.job_id,
                node_id: args.node_id,
                owner_id: args.owner_id,
                status,
            };
            let resp: RunsResponse =
                call(conn, Method::GET, "api/runs", Some(&filter), None::<&()>).await?;
            print_json(&resp.runs);
        }
        RunCommand::GetScheduled(args) => {
            #[derive(serde::Serialize)]
            struct Query<'a> {
                node_id: &'a str,
            }
            let resp: RunsResponse = call(
                conn,
                Method::GET,
                "api/runs/scheduled",
                Some(&Query {
                    node_id: &args.node_id,
                }),
                None::<&()>,
            )
            .await?;
            print_json(&resp.runs);
        }
    }
    Ok(())
}
