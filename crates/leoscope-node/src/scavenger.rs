//! Scavenger sweep (§4.6 step 4): when this node's scavenger bit is set,
//! every overhead container is reclaimed — its run is marked ABORTED and,
//! if its job is an ATQ job still inside its validity window, the firing
//! is rescheduled to the nearest free slot rather than simply dropped.

use leoscope_core::model::{Job, JobSchedule};

use crate::container;
use crate::executor::ExecutorContext;

/// Runs one scavenger sweep. `jobs` is this node's currently admitted set
/// (the same snapshot the caller used for this tick's dispatch), used to
/// decide whether a reclaimed ATQ job should be rescheduled.
pub async fn sweep(ctx: &ExecutorContext, jobs: &[Job]) -> Result<Vec<String>, anyhow::Error> {
    let overhead = container::list_overhead_containers(&ctx.docker).await?;
    let mut rescheduled = Vec::new();

    for c in overhead {
        if let Err(e) = crate::executor::abort(ctx, &c.run_id, &c.id, "reclaimed by scavenger").await {
            tracing::warn!(run_id = %c.run_id, error = %e, "failed to abort scavenged run");
            continue;
        }

        let Some(job) = jobs.iter().find(|j| j.id == c.job_id) else {
            continue;
        };
        let now = chrono::Utc::now().timestamp();
        if !should_reschedule(job, now) {
            continue;
        }
        match ctx.rpc.reschedule_job_nearest(&job.id, now).await {
            Ok(_) => rescheduled.push(job.id.clone()),
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "failed to reschedule scavenged job"),
        }
    }

    Ok(rescheduled)
}

/// A scavenged run is only worth re-arming if its job is ATQ (CRON jobs
/// simply fire again at their next occurrence) and still inside its
/// validity window.
fn should_reschedule(job: &Job, now: i64) -> bool {
    matches!(job.schedule, JobSchedule::Atq { .. }) && now < job.validity.end_ts
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::model::{JobParams, Validity};

    fn atq_job(end_ts: i64) -> Job {
        Job {
            id: "j1".into(),
            node_id: "n1".into(),
            owner_id: "u1".into(),
            schedule: JobSchedule::Atq { at_ts: 100 },
            validity: Validity { start_ts: 0, end_ts },
            length_secs: 60,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    #[test]
    fn atq_job_still_in_validity_window_is_rescheduled() {
        assert!(should_reschedule(&atq_job(1_000), 500));
    }

    #[test]
    fn atq_job_past_its_validity_window_is_not_rescheduled() {
        assert!(!should_reschedule(&atq_job(1_000), 1_000));
    }

    #[test]
    fn cron_job_is_never_rescheduled_by_the_scavenger() {
        let mut job = atq_job(1_000);
        job.schedule = JobSchedule::Cron {
            expr: "* * * * *".to_string(),
        };
        assert!(!should_reschedule(&job, 500));
    }
}
