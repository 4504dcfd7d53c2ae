//! Per-run lifecycle (C7): deploy → trigger gate → (server rendezvous) →
//! run → upload → finish. Triggered locally at a firing instant by the
//! CRON/ATQ dispatchers; owns the run's status transitions end to end.
//!
//! ```text
//! SCHEDULED → DEPLOYING → RUNNING → UPLOADING → COMPLETED
//!                                          ↘ FAILED
//!                      ↘ SKIPPED (trigger false at firing)
//!                      ↘ ABORTED (scavenger or external cancel)
//! ```
//!
//! Failure policy: a failure in any phase transitions the run to FAILED
//! with a human-readable `status_message`, still attempts log capture and
//! upload, and always removes the container and the working directory.

use std::sync::Arc;
use std::time::Duration;

use bollard::Docker;
use leoscope_config::Config;
use leoscope_core::model::{Job, RunStatus};
use leoscope_core::trigger;

use crate::container::{self, LaunchSpec};
use crate::monitors::SharedSnapshot;
use crate::rpc_client::RpcClient;
use crate::{blob, workdir};

const CONTAINER_POLL_PERIOD: Duration = Duration::from_secs(5);
const EXECUTION_GRACE: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ExecutorContext {
    pub rpc: RpcClient,
    pub docker: Arc<Docker>,
    pub config: Config,
    pub snapshot: SharedSnapshot,
    pub node_id: String,
}

/// Drives one run from firing to a terminal status. Never returns an
/// error for a failed *run* — run failure is recorded on the run record
/// itself (FAILED). An `Err` here means the executor could not even
/// record that outcome with the coordinator after retries, which the
/// caller logs and otherwise treats as a dropped run for this tick.
pub async fn execute(ctx: &ExecutorContext, job: &Job, run_id: &str, start_ts: i64) -> Result<(), anyhow::Error> {
    let wd = workdir::create(&ctx.config.data_dir, &job.id, run_id).await?;
    workdir::write_config(&wd, &job.config).await?;

    ctx.rpc
        .create_run(
            run_id,
            &job.id,
            &ctx.node_id,
            &job.owner_id,
            start_ts,
            RunStatus::Deploying,
            Some("materializing config".to_string()),
        )
        .await?;

    if let Some(expr) = job.trigger.as_deref() {
        let snapshot = crate::monitors::read_snapshot(&ctx.snapshot).await;
        if !trigger::evaluate(expr, &snapshot) {
            ctx.rpc
                .update_run(
                    run_id,
                    Some(RunStatus::Skipped),
                    Some("trigger false at firing".to_string()),
                    None,
                    Some(now_ts()),
                )
                .await?;
            workdir::remove(&wd).await?;
            return Ok(());
        }
    }

    let mut server_ip: Option<String> = None;
    if let Some(peer_node_id) = job.paired_server_node_id.as_deref() {
        match rendezvous_with_server(ctx, job, run_id, peer_node_id).await {
            Ok(ip) => server_ip = ip,
            Err(message) => {
                finish_failed(ctx, run_id, &wd, None, &message).await?;
                return Ok(());
            }
        }
    }

    let Some(image) = job.params.execute.as_deref() else {
        finish_failed(ctx, run_id, &wd, None, "no execute image configured in job params").await?;
        return Ok(());
    };

    ctx.rpc
        .update_run(run_id, Some(RunStatus::Running), Some("launching container".to_string()), None, None)
        .await?;

    let container_name = format!("leoscope-{run_id}");
    let env = build_env(job, run_id, start_ts, server_ip.as_deref());
    let spec = LaunchSpec {
        name: container_name,
        image,
        workdir_host_path: &wd,
        env,
        job_id: &job.id,
        run_id,
        node_id: &ctx.node_id,
        overhead: job.overhead,
    };
    let container_id = match container::launch(&ctx.docker, spec).await {
        Ok(id) => id,
        Err(e) => {
            finish_failed(ctx, run_id, &wd, None, &format!("container launch failed: {e}")).await?;
            return Ok(());
        }
    };

    let deadline = tokio::time::Instant::now() + Duration::from_secs(job.length_secs) + EXECUTION_GRACE;
    let mut timed_out = false;
    loop {
        if tokio::time::Instant::now() >= deadline {
            timed_out = true;
            break;
        }
        match container::poll_exit_code(&ctx.docker, &container_id).await {
            Ok(Some(_exit_code)) => break,
            Ok(None) => tokio::time::sleep(CONTAINER_POLL_PERIOD).await,
            Err(e) => {
                finish_failed(ctx, run_id, &wd, Some(&container_id), &format!("container inspect failed: {e}")).await?;
                return Ok(());
            }
        }
    }

    if timed_out {
        let _ = container::stop_and_remove(&ctx.docker, &container_id, ctx.config.container_stop_grace).await;
        finish_failed(
            ctx,
            run_id,
            &wd,
            None,
            &format!("exceeded wall-clock ceiling of {}s", job.length_secs + EXECUTION_GRACE.as_secs()),
        )
        .await?;
        return Ok(());
    }

    ctx.rpc
        .update_run(run_id, Some(RunStatus::Uploading), Some("capturing logs".to_string()), None, None)
        .await?;

    let logs = container::capture_logs(&ctx.docker, &container_id).await.unwrap_or_default();
    workdir::write_logs(&wd, &logs).await?;

    let upload_result = blob::upload_with_retry(3, Duration::from_secs(2), || {
        blob::upload(&ctx.config.data_dir, &ctx.node_id, &job.id, start_ts, run_id, &wd)
    })
    .await;

    container::stop_and_remove(&ctx.docker, &container_id, ctx.config.container_stop_grace).await?;

    match upload_result {
        Ok(artifact_url) => {
            ctx.rpc
                .update_run(
                    run_id,
                    Some(RunStatus::Completed),
                    Some("run completed".to_string()),
                    Some(artifact_url),
                    Some(now_ts()),
                )
                .await?;
        }
        Err(e) => {
            ctx.rpc
                .update_run(
                    run_id,
                    Some(RunStatus::Failed),
                    Some(format!("artifact upload failed: {e}")),
                    None,
                    Some(now_ts()),
                )
                .await?;
        }
    }

    workdir::remove(&wd).await?;
    Ok(())
}

/// Client-side half of §4.5: schedules a `SERVER_SETUP` task for the
/// paired node and polls until it completes or the rendezvous window
/// elapses, returning the peer's `public_ip` to inject as
/// `LEOTEST_SERVER_IP`. `Err` carries a human-readable failure reason.
async fn rendezvous_with_server(
    ctx: &ExecutorContext,
    job: &Job,
    run_id: &str,
    peer_node_id: &str,
) -> Result<Option<String>, String> {
    let task_id = uuid::Uuid::new_v4().to_string();
    ctx.rpc
        .schedule_task(
            &task_id,
            run_id,
            &job.id,
            peer_node_id,
            leoscope_core::model::TaskKind::ServerSetup,
            job.length_secs,
        )
        .await
        .map_err(|e| format!("failed to schedule server setup task: {e}"))?;

    let ttl = Duration::from_secs(job.length_secs.min(300));
    let deadline = tokio::time::Instant::now() + ttl;
    loop {
        let task = ctx
            .rpc
            .get_task(&task_id)
            .await
            .map_err(|e| format!("failed to poll server setup task: {e}"))?;
        match task.map(|t| t.status) {
            Some(leoscope_core::model::TaskStatus::Complete) => break,
            Some(leoscope_core::model::TaskStatus::Failed) => {
                return Err("peer node reported server setup failure".to_string());
            }
            _ => {}
        }
        if tokio::time::Instant::now() >= deadline {
            return Err("timed out waiting for paired server setup".to_string());
        }
        tokio::time::sleep(ctx.config.task_rendezvous_poll).await;
    }

    let filter = leoscope_core::wire::GetNodesFilter {
        node_id: Some(peer_node_id.to_string()),
        ..Default::default()
    };
    let nodes = ctx
        .rpc
        .get_nodes(&filter)
        .await
        .map_err(|e| format!("failed to look up paired node: {e}"))?;
    Ok(nodes.into_iter().next().and_then(|n| n.public_ip))
}

fn build_env(job: &Job, run_id: &str, start_ts: i64, server_ip: Option<&str>) -> Vec<(String, String)> {
    let mut env = vec![
        ("LEOTEST_JOBID".to_string(), job.id.clone()),
        ("LEOTEST_RUNID".to_string(), run_id.to_string()),
        ("LEOTEST_NODEID".to_string(), job.node_id.clone()),
        ("LEOTEST_START_TIME".to_string(), start_ts.to_string()),
        ("LEOTEST_LENGTH".to_string(), job.length_secs.to_string()),
        // This executor only ever launches the job-owning (client) side;
        // the paired server's own setup runs through task rendezvous,
        // not a container this executor supervises.
        ("LEOTEST_SERVER".to_string(), "0".to_string()),
    ];
    if let Some(ip) = server_ip {
        env.push(("LEOTEST_SERVER_IP".to_string(), ip.to_string()));
    }
    env
}

async fn finish_failed(
    ctx: &ExecutorContext,
    run_id: &str,
    wd: &std::path::Path,
    container_id: Option<&str>,
    message: &str,
) -> Result<(), anyhow::Error> {
    tracing::warn!(run_id, message, "run failed");
    if let Some(id) = container_id {
        let _ = container::stop_and_remove(&ctx.docker, id, ctx.config.container_stop_grace).await;
    }
    ctx.rpc
        .update_run(run_id, Some(RunStatus::Failed), Some(message.to_string()), None, Some(now_ts()))
        .await?;
    workdir::remove(wd).await?;
    Ok(())
}

/// Marks a run ABORTED out of band (scavenger sweep, external cancel),
/// stopping and removing its container first.
pub async fn abort(ctx: &ExecutorContext, run_id: &str, container_id: &str, message: &str) -> Result<(), anyhow::Error> {
    container::stop_and_remove(&ctx.docker, container_id, ctx.config.container_stop_grace).await?;
    ctx.rpc
        .update_run(run_id, Some(RunStatus::Aborted), Some(message.to_string()), None, Some(now_ts()))
        .await?;
    Ok(())
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::model::{JobParams, JobSchedule, Validity};

    fn job() -> Job {
        Job {
            id: "job-1".into(),
            node_id: "node-1".into(),
            owner_id: "owner-1".into(),
            schedule: JobSchedule::Atq { at_ts: 100 },
            validity: Validity {
                start_ts: 0,
                end_ts: 1_000,
            },
            length_secs: 120,
            overhead: false,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    #[test]
    fn build_env_always_marks_the_launched_container_as_client_side() {
        let env = build_env(&job(), "run-1", 100, None);
        assert!(env.contains(&("LEOTEST_SERVER".to_string(), "0".to_string())));
        assert!(!env.iter().any(|(k, _)| k == "LEOTEST_SERVER_IP"));
    }

    #[test]
    fn build_env_carries_the_peers_ip_when_rendezvous_succeeded() {
        let env = build_env(&job(), "run-1", 100, Some("10.0.0.5"));
        assert!(env.contains(&("LEOTEST_SERVER_IP".to_string(), "10.0.0.5".to_string())));
    }

    #[test]
    fn build_env_carries_run_identity_and_length() {
        let env = build_env(&job(), "run-42", 555, None);
        assert!(env.contains(&("LEOTEST_JOBID".to_string(), "job-1".to_string())));
        assert!(env.contains(&("LEOTEST_RUNID".to_string(), "run-42".to_string())));
        assert!(env.contains(&("LEOTEST_START_TIME".to_string(), "555".to_string())));
        assert!(env.contains(&("LEOTEST_LENGTH".to_string(), "120".to_string())));
    }
}
