use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;

use leoscope_core::model::{Run, RunStatus};

const RUN_COLUMNS: &str =
    "id, job_id, node_id, owner_id, status, start_ts, end_ts, status_message, artifact_url";

fn row_to_run(row: sqlx::sqlite::SqliteRow) -> Result<Run, anyhow::Error> {
    let status = parse_status(&row.get::<String, _>("status"))?;
    Ok(Run {
        id: row.get::<String, _>("id"),
        job_id: row.get::<String, _>("job_id"),
        node_id: row.get::<String, _>("node_id"),
        owner_id: row.get::<String, _>("owner_id"),
        status,
        start_ts: row.get::<i64, _>("start_ts"),
        end_ts: row.get::<Option<i64>, _>("end_ts"),
        status_message: row.get::<String, _>("status_message"),
        artifact_url: row.get::<Option<String>, _>("artifact_url"),
    })
}

fn parse_status(s: &str) -> Result<RunStatus, anyhow::Error> {
    Ok(match s {
        "SCHEDULED" => RunStatus::Scheduled,
        "DEPLOYING" => RunStatus::Deploying,
        "RUNNING" => RunStatus::Running,
        "UPLOADING" => RunStatus::Uploading,
        "COMPLETED" => RunStatus::Completed,
        "FAILED" => RunStatus::Failed,
        "ABORTED" => RunStatus::Aborted,
        "SKIPPED" => RunStatus::Skipped,
        other => anyhow::bail!("unknown run status: {other}"),
    })
}

fn status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Scheduled => "SCHEDULED",
        RunStatus::Deploying => "DEPLOYING",
        RunStatus::Running => "RUNNING",
        RunStatus::Uploading => "UPLOADING",
        RunStatus::Completed => "COMPLETED",
        RunStatus::Failed => "FAILED",
        RunStatus::Aborted => "ABORTED",
        RunStatus::Skipped => "SKIPPED",
    }
}

pub async fn create_run(db: &SqlitePool, run: &Run) -> Result<(), anyhow::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query(
        r#"
        INSERT INTO runs (id, job_id, node_id, owner_id, status, start_ts, end_ts, status_message, artifact_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(&run.id)
    .bind(&run.job_id)
    .bind(&run.node_id)
    .bind(&run.owner_id)
    .bind(status_str(run.status))
    .bind(run.start_ts)
    .bind(run.end_ts)
    .bind(&run.status_message)
    .bind(run.artifact_url.as_deref())
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn get_run(db: &SqlitePool, run_id: &str) -> Result<Option<Run>, anyhow::Error> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ? LIMIT 1");
    let row = sqlx::query(&sql).bind(run_id).fetch_optional(db).await?;
    row.map(row_to_run).transpose()
}

/// Applies a partial update to a run, enforcing the forward-only status
/// DAG. Returns `Ok(false)` (not an error) when the requested transition
/// is illegal — the caller turns that into an `INVALID` RPC response.
///
/// There is no separate create-run RPC: a node's first `update_run` call
/// for a given `run_id` doubles as its creation, provided `job_id`,
/// `node_id`, `owner_id` and `start_ts` are supplied. Later calls for the
/// same `run_id` omit them and only drive the status DAG forward.
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub status_message: Option<String>,
    pub artifact_url: Option<String>,
    pub end_ts: Option<i64>,
    pub job_id: Option<String>,
    pub node_id: Option<String>,
    pub owner_id: Option<String>,
    pub start_ts: Option<i64>,
}

pub async fn update_run(
    db: &SqlitePool,
    run_id: &str,
    update: RunUpdate,
) -> Result<bool, anyhow::Error> {
    let Some(existing) = get_run(db, run_id).await? else {
        let (Some(job_id), Some(node_id), Some(owner_id), Some(start_ts)) =
            (update.job_id, update.node_id, update.owner_id, update.start_ts)
        else {
            return Ok(false);
        };
        let run = Run {
            id: run_id.to_string(),
            job_id,
            node_id,
            owner_id,
            status: update.status.unwrap_or(RunStatus::Scheduled),
            start_ts,
            end_ts: update.end_ts,
            status_message: update.status_message.unwrap_or_default(),
            artifact_url: update.artifact_url,
        };
        create_run(db, &run).await?;
        return Ok(true);
    };

    let new_status = update.status.unwrap_or(existing.status);
    if !existing.status.can_transition_to(new_status) {
        return Ok(false);
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let status_message = update.status_message.unwrap_or(existing.status_message);
    let artifact_url = update.artifact_url.or(existing.artifact_url);
    let end_ts = update.end_ts.or(existing.end_ts);

    sqlx::query(
        "UPDATE runs SET status = ?, status_message = ?, artifact_url = ?, end_ts = ?, updated_at = ? WHERE id = ?",
    )
    .bind(status_str(new_status))
    .bind(status_message)
    .bind(artifact_url)
    .bind(end_ts)
    .bind(now)
    .bind(run_id)
    .execute(db)
    .await?;
    Ok(true)
}

#[derive(Default)]
pub struct RunsFilter<'a> {
    pub job_id: Option<&'a str>,
    pub node_id: Option<&'a str>,
    pub owner_id: Option<&'a str>,
    pub status: Option<RunStatus>,
}

pub async fn get_runs(db: &SqlitePool, filter: RunsFilter<'_>) -> Result<Vec<Run>, anyhow::Error> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY start_ts DESC");
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    let runs = rows
        .into_iter()
        .map(row_to_run)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs
        .into_iter()
        .filter(|r| filter.job_id.is_none_or(|id| r.job_id == id))
        .filter(|r| filter.node_id.is_none_or(|id| r.node_id == id))
        .filter(|r| filter.owner_id.is_none_or(|id| r.owner_id == id))
        .filter(|r| filter.status.is_none_or(|s| r.status == s))
        .collect())
}

pub async fn get_scheduled_runs(db: &SqlitePool, node_id: &str) -> Result<Vec<Run>, anyhow::Error> {
    get_runs(
        db,
        RunsFilter {
            node_id: Some(node_id),
            status: Some(RunStatus::Scheduled),
            ..Default::default()
        },
    )
    .await
}

/// Deletes runs that ended before `cutoff_ts`. A run with no `end_ts` is
/// still in flight and is never pruned, no matter how old `start_ts` is.
pub async fn prune_runs_ended_before(db: &SqlitePool, cutoff_ts: i64) -> Result<u64, anyhow::Error> {
    let result = sqlx::query("DELETE FROM runs WHERE end_ts IS NOT NULL AND end_ts < ?")
        .bind(cutoff_ts)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_run(id: &str) -> Run {
        Run {
            id: id.into(),
            job_id: "job1".into(),
            node_id: "n1".into(),
            owner_id: "owner1".into(),
            status: RunStatus::Scheduled,
            start_ts: 1000,
            end_ts: None,
            status_message: String::new(),
            artifact_url: None,
        }
    }

    #[tokio::test]
    async fn update_run_rejects_backward_transition() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let mut run = sample_run("r1");
        run.status = RunStatus::Running;
        create_run(&pool, &run).await.unwrap();

        let ok = update_run(
            &pool,
            "r1",
            RunUpdate {
                status: Some(RunStatus::Deploying),
                status_message: None,
                artifact_url: None,
                end_ts: None,
                job_id: None,
                node_id: None,
                owner_id: None,
                start_ts: None,
            },
        )
        .await
        .unwrap();
        assert!(!ok);

        let fetched = get_run(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn update_run_accepts_forward_transition_and_sets_fields() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        create_run(&pool, &sample_run("r1")).await.unwrap();

        let ok = update_run(
            &pool,
            "r1",
            RunUpdate {
                status: Some(RunStatus::Deploying),
                status_message: Some("deploying container".into()),
                artifact_url: None,
                end_ts: None,
                job_id: None,
                node_id: None,
                owner_id: None,
                start_ts: None,
            },
        )
        .await
        .unwrap();
        assert!(ok);

        let fetched = get_run(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Deploying);
        assert_eq!(fetched.status_message, "deploying container");
    }

    #[tokio::test]
    async fn update_run_creates_a_new_run_on_first_call() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let ok = update_run(
            &pool,
            "r-new",
            RunUpdate {
                status: Some(RunStatus::Deploying),
                status_message: Some("starting".into()),
                artifact_url: None,
                end_ts: None,
                job_id: Some("job1".into()),
                node_id: Some("n1".into()),
                owner_id: Some("owner1".into()),
                start_ts: Some(2000),
            },
        )
        .await
        .unwrap();
        assert!(ok);

        let fetched = get_run(&pool, "r-new").await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Deploying);
        assert_eq!(fetched.job_id, "job1");
        assert_eq!(fetched.node_id, "n1");
        assert_eq!(fetched.start_ts, 2000);
    }

    #[tokio::test]
    async fn update_run_on_missing_run_without_creation_fields_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let ok = update_run(
            &pool,
            "r-ghost",
            RunUpdate {
                status: Some(RunStatus::Deploying),
                status_message: None,
                artifact_url: None,
                end_ts: None,
                job_id: None,
                node_id: None,
                owner_id: None,
                start_ts: None,
            },
        )
        .await
        .unwrap();
        assert!(!ok);
        assert!(get_run(&pool, "r-ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_scheduled_runs_filters_by_node_and_status() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        create_run(&pool, &sample_run("r1")).await.unwrap();
        let mut other = sample_run("r2");
        other.node_id = "n2".into();
        create_run(&pool, &other).await.unwrap();

        let runs = get_scheduled_runs(&pool, "n1").await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, "r1");
    }

    #[tokio::test]
    async fn prune_runs_ended_before_only_removes_old_finished_runs() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let mut old_finished = sample_run("old");
        old_finished.status = RunStatus::Completed;
        old_finished.end_ts = Some(1_000);
        create_run(&pool, &old_finished).await.unwrap();

        let mut recent_finished = sample_run("recent");
        recent_finished.status = RunStatus::Completed;
        recent_finished.end_ts = Some(9_000);
        create_run(&pool, &recent_finished).await.unwrap();

        let mut still_running = sample_run("running");
        still_running.status = RunStatus::Running;
        still_running.end_ts = None;
        create_run(&pool, &still_running).await.unwrap();

        let pruned = prune_runs_ended_before(&pool, 5_000).await.unwrap();
        assert_eq!(pruned, 1);

        assert!(get_run(&pool, "old").await.unwrap().is_none());
        assert!(get_run(&pool, "recent").await.unwrap().is_some());
        assert!(get_run(&pool, "running").await.unwrap().is_some());
    }
}
