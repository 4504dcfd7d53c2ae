//! Thin wrapper over `bollard` for the executor's container phase:
//! launch with env/labels/mounts, poll state, capture logs, stop+remove
//! within the scavenger's grace window.

use std::collections::HashMap;
use std::path::Path;

use bollard::Docker;
use bollard::container::{Config, LogOutput, LogsOptions};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptionsBuilder, RemoveContainerOptionsBuilder,
    StopContainerOptionsBuilder,
};
use bollard::secret::{ContainerStateStatusEnum, HostConfig};
use futures::StreamExt;

/// The label that marks every container this system launches, and the
/// overhead sub-label the scavenger uses to find containers it may
/// reclaim. See the node scheduler loop's scavenger sweep.
pub const LABEL_LEOTEST: &str = "leotest";
pub const LABEL_OVERHEAD: &str = "overhead";
pub const LABEL_JOBID: &str = "jobid";
pub const LABEL_RUNID: &str = "runid";
pub const LABEL_NODEID: &str = "nodeid";

pub fn docker_client() -> Result<Docker, anyhow::Error> {
    Ok(Docker::connect_with_local_defaults()?)
}

pub struct LaunchSpec<'a> {
    pub name: String,
    pub image: &'a str,
    pub workdir_host_path: &'a Path,
    pub env: Vec<(String, String)>,
    pub job_id: &'a str,
    pub run_id: &'a str,
    pub node_id: &'a str,
    pub overhead: bool,
}

/// Creates and starts the run's container, labelled so the scavenger
/// (and a restarted node process) can recognise and reclaim it.
pub async fn launch(docker: &Docker, spec: LaunchSpec<'_>) -> Result<String, anyhow::Error> {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    let mut labels = HashMap::new();
    labels.insert(LABEL_LEOTEST.to_string(), "true".to_string());
    labels.insert(LABEL_OVERHEAD.to_string(), spec.overhead.to_string());
    labels.insert(LABEL_JOBID.to_string(), spec.job_id.to_string());
    labels.insert(LABEL_RUNID.to_string(), spec.run_id.to_string());
    labels.insert(LABEL_NODEID.to_string(), spec.node_id.to_string());

    let bind = format!("{}:/workdir", spec.workdir_host_path.display());
    let config = Config {
        image: Some(spec.image.to_string()),
        env: Some(env),
        labels: Some(labels),
        working_dir: Some("/workdir".to_string()),
        host_config: Some(HostConfig {
            binds: Some(vec![bind]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let created = docker
        .create_container(
            Some(bollard::query_parameters::CreateContainerOptions {
                name: Some(spec.name.clone()),
                ..Default::default()
            }),
            config,
        )
        .await?;

    docker
        .start_container(&created.id, None::<bollard::query_parameters::StartContainerOptions>)
        .await?;

    Ok(created.id)
}

/// `None` while the container is still running; `Some(exit_code)` once
/// it has stopped on its own.
pub async fn poll_exit_code(docker: &Docker, container_id: &str) -> Result<Option<i64>, anyhow::Error> {
    let inspect = docker
        .inspect_container(container_id, None::<InspectContainerOptions>)
        .await?;
    let Some(state) = inspect.state else {
        return Ok(None);
    };
    if state.status != Some(ContainerStateStatusEnum::RUNNING) {
        return Ok(Some(state.exit_code.unwrap_or(-1)));
    }
    Ok(None)
}

pub async fn capture_logs(docker: &Docker, container_id: &str) -> Result<String, anyhow::Error> {
    let options = LogsOptions {
        stdout: true,
        stderr: true,
        ..Default::default()
    };
    let mut stream = docker.logs(container_id, Some(options));
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            LogOutput::StdOut { message } | LogOutput::StdErr { message } => {
                out.push_str(&String::from_utf8_lossy(&message));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Stops then removes the container, tolerating "already gone" so a
/// second cleanup attempt (e.g. after a node restart) is a no-op.
pub async fn stop_and_remove(
    docker: &Docker,
    container_id: &str,
    grace: std::time::Duration,
) -> Result<(), anyhow::Error> {
    let stop_opts = StopContainerOptionsBuilder::new().t(grace.as_secs() as i32).build();
    if let Err(e) = docker.stop_container(container_id, Some(stop_opts)).await {
        if !is_not_found(&e) {
            return Err(e.into());
        }
    }
    let remove_opts = RemoveContainerOptionsBuilder::new().force(true).build();
    if let Err(e) = docker.remove_container(container_id, Some(remove_opts)).await {
        if !is_not_found(&e) {
            return Err(e.into());
        }
    }
    Ok(())
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(e, bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404)
}

#[derive(Debug, Clone)]
pub struct OverheadContainer {
    pub id: String,
    pub job_id: String,
    pub run_id: String,
}

/// Lists containers carrying `leotest=true ∧ overhead=true` — the sole
/// handle the scavenger uses, per the container-runtime resource rule.
pub async fn list_overhead_containers(docker: &Docker) -> Result<Vec<OverheadContainer>, anyhow::Error> {
    let mut filters = HashMap::new();
    filters.insert(
        "label".to_string(),
        vec![
            format!("{LABEL_LEOTEST}=true"),
            format!("{LABEL_OVERHEAD}=true"),
        ],
    );
    let options = ListContainersOptionsBuilder::new().all(true).filters(&filters).build();
    let containers = docker.list_containers(Some(options)).await?;

    Ok(containers
        .into_iter()
        .filter_map(|c| {
            let labels = c.labels?;
            Some(OverheadContainer {
                id: c.id?,
                job_id: labels.get(LABEL_JOBID)?.clone(),
                run_id: labels.get(LABEL_RUNID)?.clone(),
            })
        })
        .collect())
}
