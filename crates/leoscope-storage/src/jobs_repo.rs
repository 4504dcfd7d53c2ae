use sqlx::{Row, SqlitePool};
use time::OffsetDateTime;

use leoscope_core::model::{Job, JobParams, JobSchedule, Validity};

const JOB_COLUMNS: &str = "id, node_id, owner_id, schedule_kind, cron_expr, atq_at_ts, \
    validity_start_ts, validity_end_ts, length_secs, overhead, paired_server_node_id, \
    trigger_expr, config, params_json";

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<Job, anyhow::Error> {
    let schedule = match row.get::<String, _>("schedule_kind").as_str() {
        "CRON" => JobSchedule::Cron {
            expr: row
                .get::<Option<String>, _>("cron_expr")
                .ok_or_else(|| anyhow::anyhow!("CRON row missing cron_expr"))?,
        },
        "ATQ" => JobSchedule::Atq {
            at_ts: row
                .get::<Option<i64>, _>("atq_at_ts")
                .ok_or_else(|| anyhow::anyhow!("ATQ row missing atq_at_ts"))?,
        },
        other => anyhow::bail!("unknown schedule_kind: {other}"),
    };

    let params: JobParams = serde_json::from_str(&row.get::<String, _>("params_json"))?;

    Ok(Job {
        id: row.get::<String, _>("id"),
        node_id: row.get::<String, _>("node_id"),
        owner_id: row.get::<String, _>("owner_id"),
        schedule,
        validity: Validity {
            start_ts: row.get::<i64, _>("validity_start_ts"),
            end_ts: row.get::<i64, _>("validity_end_ts"),
        },
        length_secs: row.get::<i64, _>("length_secs") as u64,
        overhead: row.get::<i64, _>("overhead") != 0,
        paired_server_node_id: row.get::<Option<String>, _>("paired_server_node_id"),
        trigger: row.get::<Option<String>, _>("trigger_expr"),
        config: row.get::<String, _>("config"),
        params,
    })
}

/// Inserts or replaces a job by id, overwriting every column on conflict.
/// Callers that need the same-id-same-payload-is-a-no-op guarantee must
/// compare against the existing row themselves before calling this —
/// see `AdmissionGate::schedule_job`, which is the only caller.
pub async fn put_job(db: &SqlitePool, job: &Job) -> Result<(), anyhow::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let (schedule_kind, cron_expr, atq_at_ts) = match &job.schedule {
        JobSchedule::Cron { expr } => ("CRON", Some(expr.as_str()), None),
        JobSchedule::Atq { at_ts } => ("ATQ", None, Some(*at_ts)),
    };
    let params_json = serde_json::to_string(&job.params)?;

    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, node_id, owner_id, schedule_kind, cron_expr, atq_at_ts,
            validity_start_ts, validity_end_ts, length_secs, overhead,
            paired_server_node_id, trigger_expr, config, params_json,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            node_id = excluded.node_id,
            owner_id = excluded.owner_id,
            schedule_kind = excluded.schedule_kind,
            cron_expr = excluded.cron_expr,
            atq_at_ts = excluded.atq_at_ts,
            validity_start_ts = excluded.validity_start_ts,
            validity_end_ts = excluded.validity_end_ts,
            length_secs = excluded.length_secs,
            overhead = excluded.overhead,
            paired_server_node_id = excluded.paired_server_node_id,
            trigger_expr = excluded.trigger_expr,
            config = excluded.config,
            params_json = excluded.params_json,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&job.id)
    .bind(&job.node_id)
    .bind(&job.owner_id)
    .bind(schedule_kind)
    .bind(cron_expr)
    .bind(atq_at_ts)
    .bind(job.validity.start_ts)
    .bind(job.validity.end_ts)
    .bind(job.length_secs as i64)
    .bind(job.overhead as i64)
    .bind(job.paired_server_node_id.as_deref())
    .bind(job.trigger.as_deref())
    .bind(&job.config)
    .bind(params_json)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn get_job(db: &SqlitePool, job_id: &str) -> Result<Option<Job>, anyhow::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ? LIMIT 1");
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(db).await?;
    row.map(row_to_job).transpose()
}

pub async fn get_jobs_by_node_id(db: &SqlitePool, node_id: &str) -> Result<Vec<Job>, anyhow::Error> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE node_id = ? OR paired_server_node_id = ? ORDER BY id"
    );
    let rows = sqlx::query(&sql)
        .bind(node_id)
        .bind(node_id)
        .fetch_all(db)
        .await?;
    rows.into_iter().map(row_to_job).collect()
}

pub async fn get_jobs_by_owner_id(db: &SqlitePool, owner_id: &str) -> Result<Vec<Job>, anyhow::Error> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE owner_id = ? ORDER BY id");
    let rows = sqlx::query(&sql).bind(owner_id).fetch_all(db).await?;
    rows.into_iter().map(row_to_job).collect()
}

pub async fn set_atq_start(db: &SqlitePool, job_id: &str, start_ts: i64) -> Result<bool, anyhow::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(
        "UPDATE jobs SET atq_at_ts = ?, validity_start_ts = ?, updated_at = ? WHERE id = ? AND schedule_kind = 'ATQ'",
    )
    .bind(start_ts)
    .bind(start_ts)
    .bind(now)
    .bind(job_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_job(db: &SqlitePool, job_id: &str) -> Result<bool, anyhow::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(job_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_job(id: &str, node_id: &str) -> Job {
        Job {
            id: id.into(),
            node_id: node_id.into(),
            owner_id: "owner1".into(),
            schedule: JobSchedule::Cron {
                expr: "*/10 * * * *".into(),
            },
            validity: Validity {
                start_ts: 0,
                end_ts: 3600,
            },
            length_secs: 300,
            overhead: true,
            paired_server_node_id: None,
            trigger: None,
            config: String::new(),
            params: JobParams::default(),
        }
    }

    #[tokio::test]
    async fn put_job_is_idempotent_by_id() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let job = sample_job("j1", "n1");
        put_job(&pool, &job).await.unwrap();
        put_job(&pool, &job).await.unwrap();

        let jobs = get_jobs_by_node_id(&pool, "n1").await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn get_jobs_by_node_id_matches_client_and_paired_server() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let mut job = sample_job("j1", "client_node");
        job.paired_server_node_id = Some("server_node".into());
        put_job(&pool, &job).await.unwrap();

        assert_eq!(get_jobs_by_node_id(&pool, "client_node").await.unwrap().len(), 1);
        assert_eq!(get_jobs_by_node_id(&pool, "server_node").await.unwrap().len(), 1);
        assert_eq!(get_jobs_by_node_id(&pool, "other_node").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn set_atq_start_rejects_cron_jobs() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let job = sample_job("j1", "n1");
        put_job(&pool, &job).await.unwrap();
        assert!(!set_atq_start(&pool, "j1", 500).await.unwrap());
    }
}
