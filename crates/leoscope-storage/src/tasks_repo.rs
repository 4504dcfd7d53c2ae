use sqlx::{Row, SqlitePool};

use leoscope_core::model::{Task, TaskKind, TaskStatus};

const TASK_COLUMNS: &str = "id, run_id, job_id, node_id, kind_json, status, ttl_secs, created_ts";

fn row_to_task(row: sqlx::sqlite::SqliteRow) -> Result<Task, anyhow::Error> {
    let kind: TaskKind = serde_json::from_str(&row.get::<String, _>("kind_json"))?;
    let status = match row.get::<String, _>("status").as_str() {
        "PENDING" => TaskStatus::Pending,
        "COMPLETE" => TaskStatus::Complete,
        "FAILED" => TaskStatus::Failed,
        other => anyhow::bail!("unknown task status: {other}"),
    };

    Ok(Task {
        id: row.get::<String, _>("id"),
        run_id: row.get::<String, _>("run_id"),
        job_id: row.get::<String, _>("job_id"),
        node_id: row.get::<String, _>("node_id"),
        kind,
        status,
        ttl_secs: row.get::<i64, _>("ttl_secs") as u64,
        created_ts: row.get::<i64, _>("created_ts"),
    })
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "PENDING",
        TaskStatus::Complete => "COMPLETE",
        TaskStatus::Failed => "FAILED",
    }
}

pub async fn schedule_task(db: &SqlitePool, task: &Task) -> Result<(), anyhow::Error> {
    let kind_json = serde_json::to_string(&task.kind)?;
    sqlx::query(
        r#"
        INSERT INTO tasks (id, run_id, job_id, node_id, kind_json, status, ttl_secs, created_ts)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET status = excluded.status
        "#,
    )
    .bind(&task.id)
    .bind(&task.run_id)
    .bind(&task.job_id)
    .bind(&task.node_id)
    .bind(kind_json)
    .bind(status_str(task.status))
    .bind(task.ttl_secs as i64)
    .bind(task.created_ts)
    .execute(db)
    .await?;
    Ok(())
}

#[derive(Default)]
pub struct TasksFilter<'a> {
    pub task_id: Option<&'a str>,
    pub node_id: Option<&'a str>,
    pub run_id: Option<&'a str>,
}

/// Reads tasks matching `filter`, excluding ones the coordinator treats as
/// dead on read (`created_ts + ttl_secs < now_ts`) — no background sweeper
/// deletes them, a dead row simply stops being visible.
pub async fn get_tasks(
    db: &SqlitePool,
    filter: TasksFilter<'_>,
    now_ts: i64,
) -> Result<Vec<Task>, anyhow::Error> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_ts");
    let rows = sqlx::query(&sql).fetch_all(db).await?;
    let tasks = rows
        .into_iter()
        .map(row_to_task)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tasks
        .into_iter()
        .filter(|t| filter.task_id.is_none_or(|id| t.id == id))
        .filter(|t| filter.node_id.is_none_or(|id| t.node_id == id))
        .filter(|t| filter.run_id.is_none_or(|id| t.run_id == id))
        .filter(|t| !t.is_dead(now_ts))
        .collect())
}

pub async fn update_task_status(
    db: &SqlitePool,
    task_id: &str,
    status: TaskStatus,
) -> Result<bool, anyhow::Error> {
    let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
        .bind(status_str(status))
        .bind(task_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.into(),
            run_id: "run1".into(),
            job_id: "job1".into(),
            node_id: "n1".into(),
            kind: TaskKind::ServerSetup,
            status: TaskStatus::Pending,
            ttl_secs: 60,
            created_ts: 1000,
        }
    }

    #[tokio::test]
    async fn schedule_then_update_status() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        schedule_task(&pool, &sample_task("t1")).await.unwrap();
        assert!(update_task_status(&pool, "t1", TaskStatus::Complete).await.unwrap());

        let tasks = get_tasks(
            &pool,
            TasksFilter {
                task_id: Some("t1"),
                ..Default::default()
            },
            1_030,
        )
        .await
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Complete);
    }

    #[tokio::test]
    async fn expired_task_is_not_returned() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let task = sample_task("t1"); // created_ts 1000, ttl_secs 60
        schedule_task(&pool, &task).await.unwrap();

        let still_alive = get_tasks(&pool, TasksFilter { task_id: Some("t1"), ..Default::default() }, 1_059)
            .await
            .unwrap();
        assert_eq!(still_alive.len(), 1);

        let dead = get_tasks(&pool, TasksFilter { task_id: Some("t1"), ..Default::default() }, 1_061)
            .await
            .unwrap();
        assert!(dead.is_empty());
    }

    #[tokio::test]
    async fn custom_kind_round_trips_through_json() {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::init(tmp.path()).await.unwrap();

        let mut task = sample_task("t2");
        task.kind = TaskKind::Custom {
            name: "ingest".into(),
        };
        schedule_task(&pool, &task).await.unwrap();

        let fetched = get_tasks(
            &pool,
            TasksFilter {
                task_id: Some("t2"),
                ..Default::default()
            },
            1_030,
        )
        .await
        .unwrap();
        assert_eq!(fetched[0].kind, TaskKind::Custom { name: "ingest".into() });
    }
}
