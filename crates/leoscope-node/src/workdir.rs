//! Per-run working directories: `workdir/<job_id>/<run_id>`, created at
//! DEPLOYING and removed once the run reaches a terminal state.

use std::path::{Path, PathBuf};

pub fn workdir_root(data_dir: &Path) -> PathBuf {
    data_dir.join("workdir")
}

pub fn run_workdir(data_dir: &Path, job_id: &str, run_id: &str) -> PathBuf {
    workdir_root(data_dir).join(job_id).join(run_id)
}

pub async fn create(data_dir: &Path, job_id: &str, run_id: &str) -> Result<PathBuf, anyhow::Error> {
    let wd = run_workdir(data_dir, job_id, run_id);
    tokio::fs::create_dir_all(&wd).await?;
    Ok(wd)
}

pub async fn write_config(wd: &Path, config: &str) -> Result<(), anyhow::Error> {
    tokio::fs::write(wd.join("config"), config).await?;
    Ok(())
}

pub async fn write_logs(wd: &Path, logs: &str) -> Result<(), anyhow::Error> {
    tokio::fs::write(wd.join("container.log"), logs).await?;
    Ok(())
}

pub async fn remove(wd: &Path) -> Result<(), anyhow::Error> {
    match tokio::fs::remove_dir_all(wd).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_remove_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let wd = create(tmp.path(), "job-1", "run-1").await.unwrap();
        assert!(wd.exists());
        write_config(&wd, "{}").await.unwrap();
        assert!(wd.join("config").exists());

        remove(&wd).await.unwrap();
        assert!(!wd.exists());
    }

    #[tokio::test]
    async fn remove_on_already_missing_dir_is_not_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let wd = tmp.path().join("never-created");
        remove(&wd).await.unwrap();
    }
}
