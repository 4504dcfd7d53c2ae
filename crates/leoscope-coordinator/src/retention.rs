//! Background pruning of finished runs past `run_retention_days`. Ticks
//! hourly; in-flight runs (`end_ts` unset) are never touched regardless of
//! `start_ts` age.

use sqlx::SqlitePool;

const TICK_PERIOD: std::time::Duration = std::time::Duration::from_secs(60 * 60);

pub fn spawn(db: SqlitePool, run_retention_days: i64) {
    tokio::spawn(run_retention_loop(db, run_retention_days));
}

async fn run_retention_loop(db: SqlitePool, run_retention_days: i64) {
    loop {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let cutoff = now.saturating_sub(run_retention_days.saturating_mul(24 * 60 * 60));

        match leoscope_storage::runs_repo::prune_runs_ended_before(&db, cutoff).await {
            Ok(pruned) => {
                if pruned > 0 {
                    tracing::info!(pruned, run_retention_days, "pruned old runs");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to prune old runs");
            }
        }

        tokio::time::sleep(TICK_PERIOD).await;
    }
}
