use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use leoscope_core::error::LeoError;
use leoscope_core::model::Job;
use leoscope_core::schedule::{check_admission, reschedule_nearest};

/// Per-node mutex map serialising the admission critical section: the
/// coordinator must behave as if admissions on the same node form a
/// total order. Locks are acquired in sorted node-id order so a job
/// touching two nodes (client + paired server) can never deadlock
/// against a concurrent job touching the same pair in the other order.
#[derive(Clone, Default)]
pub struct AdmissionGate {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AdmissionGate {
    async fn lock_one(&self, node_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(node_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    async fn lock_nodes(&self, node_ids: &[&str]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&str> = node_ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut guards = Vec::with_capacity(sorted.len());
        for id in sorted {
            guards.push(self.lock_one(id).await);
        }
        guards
    }

    /// Runs admission against jobs already admitted on `job`'s touched
    /// nodes and, on success, persists it. Idempotent only for a true
    /// resubmission: the same `job_id` with an identical payload is a
    /// no-op. The same `job_id` with a *different* payload is rejected as
    /// `INVALID` rather than silently overwriting the admitted job — a
    /// caller must go through `reschedule_job_nearest` or delete-then-
    /// recreate to actually change an admitted job.
    pub async fn schedule_job(&self, db: &SqlitePool, job: Job) -> Result<(), LeoError> {
        let touched = job.conflict_node_ids();
        let _guards = self.lock_nodes(&touched).await;

        let mut existing = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut same_id = None;
        for node_id in &touched {
            let jobs = leoscope_storage::jobs_repo::get_jobs_by_node_id(db, node_id)
                .await
                .map_err(|e| LeoError::new(leoscope_core::error::ErrorCode::Unavailable, e.to_string()))?;
            for other in jobs {
                if other.id == job.id {
                    same_id = Some(other);
                } else if seen.insert(other.id.clone()) {
                    existing.push(other);
                }
            }
        }
        if same_id.is_none() {
            same_id = leoscope_storage::jobs_repo::get_job(db, &job.id)
                .await
                .map_err(|e| LeoError::new(leoscope_core::error::ErrorCode::Unavailable, e.to_string()))?;
        }

        if let Some(prior) = same_id {
            if prior == job {
                return Ok(());
            }
            return Err(LeoError::invalid(format!(
                "job_id {} is already admitted with a different payload",
                job.id
            )));
        }

        check_admission(&job, existing.iter())?;

        leoscope_storage::jobs_repo::put_job(db, &job)
            .await
            .map_err(|e| LeoError::new(leoscope_core::error::ErrorCode::Unavailable, e.to_string()))?;
        Ok(())
    }

    /// `reschedule_job_nearest`: re-admits an ATQ job at the earliest free
    /// instant `>= after_ts` inside its own validity, or `None` if the
    /// validity window is exhausted.
    pub async fn reschedule_nearest(
        &self,
        db: &SqlitePool,
        job: &Job,
        after_ts: i64,
    ) -> Result<Option<i64>, LeoError> {
        let touched = job.conflict_node_ids();
        let _guards = self.lock_nodes(&touched).await;

        let mut existing = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for node_id in &touched {
            let jobs = leoscope_storage::jobs_repo::get_jobs_by_node_id(db, node_id)
                .await
                .map_err(|e| LeoError::new(leoscope_core::error::ErrorCode::Unavailable, e.to_string()))?;
            for other in jobs {
                if other.id != job.id && seen.insert(other.id.clone()) {
                    existing.push(other);
                }
            }
        }

        let Some(start_ts) = reschedule_nearest(job, after_ts, existing.iter()) else {
            return Ok(None);
        };

        leoscope_storage::jobs_repo::set_atq_start(db, &job.id, start_ts)
            .await
            .map_err(|e| LeoError::new(leoscope_core::error::ErrorCode::Unavailable, e.to_string()))?;
        Ok(Some(start_ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leoscope_core::model::{JobParams, JobSchedule, Validity};
    use tempfile::TempDir;

    fn atq_job(id: &str, node_id: &str, at_ts: i64, end: i64, length: u64) -> Job {
        Job {
            id: id.into(),
            node_id: node_id.into(),
            owner_id: "u".into(),
            schedule: JobSchedule::Atq { at_ts },
            validity: Validity {
                start_ts: at_ts,
                end_ts: end,
            },
            length_secs: length,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    #[tokio::test]
    async fn second_overlapping_job_is_rejected_then_reschedule_finds_a_slot() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let gate = AdmissionGate::default();

        let a = atq_job("A", "n1", 1_000, 10_000, 300);
        gate.schedule_job(&pool, a.clone()).await.unwrap();

        let b = atq_job("B", "n1", 1_100, 10_000, 300);
        let err = gate.schedule_job(&pool, b.clone()).await.unwrap_err();
        assert_eq!(err.code, leoscope_core::error::ErrorCode::Conflict);

        let start = gate.reschedule_nearest(&pool, &b, 1_100).await.unwrap();
        assert_eq!(start, Some(1_300));
    }

    #[tokio::test]
    async fn resubmitting_same_job_id_is_not_self_conflicting() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let gate = AdmissionGate::default();

        let a = atq_job("A", "n1", 1_000, 10_000, 300);
        gate.schedule_job(&pool, a.clone()).await.unwrap();
        gate.schedule_job(&pool, a).await.unwrap();
    }

    #[tokio::test]
    async fn resubmitting_same_job_id_with_a_different_payload_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let gate = AdmissionGate::default();

        let a = atq_job("A", "n1", 1_000, 10_000, 300);
        gate.schedule_job(&pool, a.clone()).await.unwrap();

        let mut changed = a.clone();
        changed.node_id = "n2".into();
        let err = gate.schedule_job(&pool, changed).await.unwrap_err();
        assert_eq!(err.code, leoscope_core::error::ErrorCode::Invalid);

        // the stored job must be untouched
        let stored = leoscope_storage::jobs_repo::get_job(&pool, "A").await.unwrap().unwrap();
        assert_eq!(stored, a);
    }

    #[tokio::test]
    async fn resubmitting_with_a_conflicting_length_is_rejected_not_applied() {
        let tmp = TempDir::new().unwrap();
        let pool = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let gate = AdmissionGate::default();

        let a = atq_job("A", "n1", 1_000, 10_000, 300);
        gate.schedule_job(&pool, a.clone()).await.unwrap();

        let mut longer = a.clone();
        longer.length_secs = 9_000;
        let err = gate.schedule_job(&pool, longer).await.unwrap_err();
        assert_eq!(err.code, leoscope_core::error::ErrorCode::Invalid);

        let stored = leoscope_storage::jobs_repo::get_job(&pool, "A").await.unwrap().unwrap();
        assert_eq!(stored.length_secs, 300);
    }
}
