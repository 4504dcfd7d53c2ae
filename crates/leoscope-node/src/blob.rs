//! Client-side artifact upload: archive a run's working directory and
//! place it at `artifacts/<node_id>/<job_id>/<YYYY>/<MM>/<DD>/<run_id>.tar`.
//! Write-once per run; the path is derived deterministically from
//! `(node_id, job_id, date(start_ts), run_id)` so collisions are
//! impossible. No networked object store is wired in yet — the archive
//! lands under the node's own data directory, the same way the local
//! directory target stores completed runs before a real backend is
//! configured.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

pub fn artifact_path(data_dir: &Path, node_id: &str, job_id: &str, start_ts: i64, run_id: &str) -> PathBuf {
    let date = DateTime::<Utc>::from_timestamp(start_ts, 0).unwrap_or_else(Utc::now);
    data_dir
        .join("artifacts")
        .join(node_id)
        .join(job_id)
        .join(date.format("%Y").to_string())
        .join(date.format("%m").to_string())
        .join(date.format("%d").to_string())
        .join(format!("{run_id}.tar"))
}

/// Archives `workdir` into a `.tar` at the deterministic artifact path
/// and returns a `file://` URL for the result. Archiving is blocking
/// I/O, so it runs on the blocking thread pool.
pub async fn upload(
    data_dir: &Path,
    node_id: &str,
    job_id: &str,
    start_ts: i64,
    run_id: &str,
    workdir: &Path,
) -> Result<String, anyhow::Error> {
    let dest = artifact_path(data_dir, node_id, job_id, start_ts, run_id);
    let workdir = workdir.to_path_buf();
    let dest_for_blocking = dest.clone();

    tokio::task::spawn_blocking(move || archive_dir(&workdir, &dest_for_blocking)).await??;

    Ok(format!("file://{}", dest.display()))
}

fn archive_dir(workdir: &Path, dest: &Path) -> Result<(), anyhow::Error> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(dest)?;
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(".", workdir)?;
    builder.finish()?;
    Ok(())
}

/// Retries a fallible upload closure up to `max_attempts` times with a
/// fixed backoff, per the node-internal upload retry policy (up to 3
/// attempts; persistent failure leaves the run FAILED with the archive
/// still on disk).
pub async fn upload_with_retry<F, Fut>(max_attempts: u32, backoff: std::time::Duration, mut attempt_upload: F) -> Result<String, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String, anyhow::Error>>,
{
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match attempt_upload().await {
            Ok(url) => return Ok(url),
            Err(e) => {
                tracing::warn!(attempt, max_attempts, error = %e, "artifact upload failed");
                last_err = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("upload failed with no recorded error")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_is_deterministic_by_date() {
        let data_dir = Path::new("/data");
        let start_ts = 1_704_067_200; // 2024-01-01T00:00:00Z
        let p = artifact_path(data_dir, "n1", "j1", start_ts, "r1");
        assert_eq!(p, Path::new("/data/artifacts/n1/j1/2024/01/01/r1.tar"));
    }

    #[tokio::test]
    async fn upload_archives_the_workdir_to_the_deterministic_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let wd = tmp.path().join("wd");
        std::fs::create_dir_all(&wd).unwrap();
        std::fs::write(wd.join("config"), "{}").unwrap();

        let url = upload(tmp.path(), "n1", "j1", 1_704_067_200, "r1", &wd)
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        let path = artifact_path(tmp.path(), "n1", "j1", 1_704_067_200, "r1");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn upload_with_retry_gives_up_after_max_attempts() {
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let result = upload_with_retry(3, std::time::Duration::from_millis(1), move || {
            let attempts = attempts2.clone();
            async move {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Err::<String, _>(anyhow::anyhow!("boom"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
