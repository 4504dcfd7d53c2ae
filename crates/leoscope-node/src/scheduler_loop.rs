//! Node scheduler loop (C6). On startup: load the node's own record (for
//! coords), start the environmental monitors, and initialise the local
//! CRON/ATQ dispatchers. Each tick, period `P` (default 10s):
//!
//! 1. Pull this node's admitted job set.
//! 2. Sync local dispatch (CRON refresh + fire due jobs; ATQ arm/reschedule).
//! 3. Prune dispatcher entries for jobs no longer admitted.
//! 4. Run the scavenger sweep (after step 2, so a newly scavenger-marked
//!    job never races its own launch within the same tick).
//! 5. Send a heartbeat.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use leoscope_config::Config;
use leoscope_core::model::{Job, JobSchedule};
use leoscope_core::trigger::Snapshot;
use leoscope_core::wire::{GetNodesFilter, RunsFilter};

use crate::dispatch::atq::{AtqAction, AtqDispatcher};
use crate::dispatch::cron::CronDispatcher;
use crate::executor::{self, ExecutorContext};
use crate::monitors;
use crate::rpc_client::RpcClient;
use crate::scavenger;

/// Runs the node scheduler loop until `shutdown` is cancelled. Intended
/// to be the whole of the `agent run` subcommand's long-lived work.
pub async fn run(rpc: RpcClient, config: Config, node_id: String, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
    let docker = Arc::new(crate::container::docker_client()?);

    let nodes = rpc
        .get_nodes(&GetNodesFilter {
            node_id: Some(node_id.clone()),
            ..Default::default()
        })
        .await?;
    let node = nodes
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("node {node_id} is not registered with the coordinator"))?;

    let snapshot: monitors::SharedSnapshot = Arc::new(RwLock::new(Snapshot::new()));
    let monitor_handles = monitors::spawn_all(node.coords, snapshot.clone(), shutdown.clone());

    let ctx = ExecutorContext {
        rpc: rpc.clone(),
        docker,
        config: config.clone(),
        snapshot,
        node_id: node_id.clone(),
    };

    let mut cron = CronDispatcher::default();
    let mut atq = AtqDispatcher::default();
    let mut last_tick = Utc::now();

    let mut interval = tokio::time::interval(config.node_poll_period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        let now = Utc::now();
        if let Err(e) = tick(&ctx, &mut cron, &mut atq, last_tick, now).await {
            tracing::warn!(error = %e, "scheduler tick failed");
        }
        last_tick = now;
    }

    for handle in monitor_handles {
        handle.abort();
    }
    Ok(())
}

async fn tick(
    ctx: &ExecutorContext,
    cron: &mut CronDispatcher,
    atq: &mut AtqDispatcher,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), anyhow::Error> {
    let jobs = ctx.rpc.get_jobs_by_node(&ctx.node_id).await?;

    let cron_jobs: Vec<(&str, &str)> = jobs
        .iter()
        .filter_map(|j| match &j.schedule {
            JobSchedule::Cron { expr } => Some((j.id.as_str(), expr.as_str())),
            JobSchedule::Atq { .. } => None,
        })
        .collect();
    let rejected = cron.sync(cron_jobs);
    for job_id in rejected {
        tracing::warn!(job_id, "admitted cron job failed to re-parse at the node; skipping");
    }

    for job_id in cron.due(since, now) {
        if let Some(job) = jobs.iter().find(|j| j.id == job_id) {
            spawn_firing(ctx.clone(), job.clone(), now.timestamp());
        }
    }

    let atq_job_ids: std::collections::HashSet<String> = jobs
        .iter()
        .filter(|j| matches!(j.schedule, JobSchedule::Atq { .. }))
        .map(|j| j.id.clone())
        .collect();
    for job in jobs.iter().filter(|j| matches!(j.schedule, JobSchedule::Atq { .. })) {
        let JobSchedule::Atq { at_ts } = job.schedule else {
            continue;
        };
        let run_exists = !ctx
            .rpc
            .get_runs(&RunsFilter {
                job_id: Some(job.id.clone()),
                ..Default::default()
            })
            .await?
            .is_empty();

        let ctx_for_timer = ctx.clone();
        let job_for_timer = job.clone();
        let action = atq.note_job(&job.id, at_ts, now.timestamp(), run_exists, move || {
            tokio::spawn(async move {
                let target = DateTime::<Utc>::from_timestamp(at_ts, 0).unwrap_or(now);
                let delay = (target - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(delay).await;
                if let Err(e) = executor::execute(&ctx_for_timer, &job_for_timer, &uuid::Uuid::new_v4().to_string(), at_ts).await {
                    tracing::warn!(job_id = %job_for_timer.id, error = %e, "atq firing failed");
                }
            })
        });
        if action == AtqAction::Reschedule {
            match ctx.rpc.reschedule_job_nearest(&job.id, now.timestamp()).await {
                Ok(_) => {}
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "failed to reschedule past-due atq job"),
            }
        }
    }
    atq.prune(&atq_job_ids);

    match ctx.rpc.get_scavenger(&ctx.node_id).await {
        Ok(true) => {
            if let Err(e) = scavenger::sweep(ctx, &jobs).await {
                tracing::warn!(error = %e, "scavenger sweep failed");
            }
        }
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "failed to read scavenger state"),
    }

    if let Err(e) = ctx.rpc.report_heartbeat(&ctx.node_id).await {
        tracing::warn!(error = %e, "heartbeat failed");
    }

    Ok(())
}

fn spawn_firing(ctx: ExecutorContext, job: Job, start_ts: i64) {
    tokio::spawn(async move {
        let run_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = executor::execute(&ctx, &job, &run_id, start_ts).await {
            tracing::warn!(job_id = %job.id, error = %e, "cron firing failed");
        }
    });
}
