//! Thin `reqwest` client over the coordinator's RPC surface. Every call
//! carries the two auth headers and applies jittered exponential backoff
//! on transport failure / `UNAVAILABLE`, up to a caller-visible retry
//! budget — retries are safe because every mutator here is idempotent by
//! record id.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use leoscope_core::error::{ErrorCode, LeoError};
use leoscope_core::model::{Job, Node, RunStatus, Task, TaskKind, TaskStatus};
use leoscope_core::wire::*;

#[derive(Debug, Clone)]
pub struct RpcCredentials {
    pub caller_id: String,
    pub access_token: String,
}

#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: reqwest::Url,
    creds: RpcCredentials,
    retry_attempts: u32,
    retry_base: Duration,
}

impl RpcClient {
    pub fn new(
        base_url: &str,
        creds: RpcCredentials,
        timeout: Duration,
        retry_attempts: u32,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = reqwest::Url::parse(base_url)?;
        Ok(Self {
            http,
            base_url,
            creds,
            retry_attempts,
            retry_base: Duration::from_millis(500),
        })
    }

    fn url(&self, path: &str) -> Result<reqwest::Url, LeoError> {
        self.base_url
            .join(path)
            .map_err(|e| LeoError::new(ErrorCode::Unavailable, e.to_string()))
    }

    async fn send<Q, J, Resp>(
        &self,
        method: Method,
        path: &str,
        query: Option<&Q>,
        json: Option<&J>,
    ) -> Result<Resp, LeoError>
    where
        Q: Serialize,
        J: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.url(path)?;
        let mut attempt = 0u32;

        loop {
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .header("x-userid", &self.creds.caller_id)
                .header("x-access-token", &self.creds.access_token);
            if let Some(q) = query {
                req = req.query(q);
            }
            if let Some(body) = json {
                req = req.json(body);
            }

            let outcome = req.send().await;
            let retry_or_return = match outcome {
                Ok(resp) => Some(self.decode(resp).await),
                Err(e) => {
                    if e.is_timeout() || e.is_connect() {
                        None
                    } else {
                        Some(Err(LeoError::new(ErrorCode::Unavailable, e.to_string())))
                    }
                }
            };

            let result = match retry_or_return {
                Some(result) => result,
                None => Err(LeoError::new(ErrorCode::Unavailable, "transport error")),
            };

            match &result {
                Err(e) if e.code == ErrorCode::Unavailable && attempt < self.retry_attempts => {
                    attempt += 1;
                    tokio::time::sleep(jittered_backoff(
                        self.retry_base,
                        &self.creds.caller_id,
                        attempt,
                    ))
                    .await;
                }
                _ => return result,
            }
        }
    }

    async fn decode<Resp: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<Resp, LeoError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<Resp>()
                .await
                .map_err(|e| LeoError::new(ErrorCode::Unavailable, e.to_string()));
        }
        match resp.json::<ErrorBody>().await {
            Ok(body) => Err(LeoError {
                code: body.code,
                message: body.message,
                details: body.details,
            }),
            Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => {
                Err(LeoError::new(ErrorCode::Unavailable, "coordinator unavailable"))
            }
            Err(e) => Err(LeoError::new(ErrorCode::Unavailable, e.to_string())),
        }
    }

    pub async fn get_jobs_by_node(&self, node_id: &str) -> Result<Vec<Job>, LeoError> {
        let filter = JobsFilter {
            node_id: Some(node_id.to_string()),
            owner_id: None,
        };
        let resp: JobsResponse = self
            .send(Method::GET, "api/jobs", Some(&filter), None::<&()>)
            .await?;
        Ok(resp.jobs)
    }

    pub async fn get_nodes(&self, filter: &GetNodesFilter) -> Result<Vec<Node>, LeoError> {
        let resp: GetNodesResponse = self
            .send(Method::GET, "api/nodes", Some(filter), None::<&()>)
            .await?;
        Ok(resp.nodes)
    }

    pub async fn report_heartbeat(&self, node_id: &str) -> Result<bool, LeoError> {
        let body = HeartbeatRequest {
            node_id: node_id.to_string(),
        };
        let path = format!("api/nodes/{node_id}/heartbeat");
        let resp: HeartbeatResponse = self
            .send(Method::POST, &path, None::<&()>, Some(&body))
            .await?;
        Ok(resp.received)
    }

    pub async fn reschedule_job_nearest(
        &self,
        job_id: &str,
        after_ts: i64,
    ) -> Result<RescheduleJobResponse, LeoError> {
        let body = RescheduleJobRequest {
            job_id: job_id.to_string(),
            after_ts,
        };
        let path = format!("api/jobs/{job_id}/reschedule");
        self.send(Method::POST, &path, None::<&()>, Some(&body)).await
    }

    pub async fn get_runs(&self, filter: &RunsFilter) -> Result<Vec<leoscope_core::model::Run>, LeoError> {
        let resp: RunsResponse = self
            .send(Method::GET, "api/runs", Some(filter), None::<&()>)
            .await?;
        Ok(resp.runs)
    }

    pub async fn get_config(&self) -> Result<serde_json::Value, LeoError> {
        let resp: ConfigDoc = self.send(Method::GET, "api/config", None::<&()>, None::<&()>).await?;
        Ok(resp.doc)
    }

    pub async fn get_scavenger(&self, node_id: &str) -> Result<bool, LeoError> {
        let path = format!("api/nodes/{node_id}/scavenger");
        let resp: ScavengerState = self.send(Method::GET, &path, None::<&()>, None::<&()>).await?;
        Ok(resp.active)
    }

    pub async fn schedule_task(
        &self,
        task_id: &str,
        run_id: &str,
        job_id: &str,
        node_id: &str,
        kind: TaskKind,
        ttl_secs: u64,
    ) -> Result<(), LeoError> {
        let body = ScheduleTaskRequest {
            task_id: task_id.to_string(),
            run_id: run_id.to_string(),
            job_id: job_id.to_string(),
            node_id: node_id.to_string(),
            kind,
            ttl_secs,
        };
        let _: serde_json::Value = self
            .send(Method::POST, "api/tasks", None::<&()>, Some(&body))
            .await?;
        Ok(())
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>, LeoError> {
        let filter = TasksFilter {
            task_id: Some(task_id.to_string()),
            node_id: None,
            run_id: None,
        };
        let resp: TasksResponse = self
            .send(Method::GET, "api/tasks", Some(&filter), None::<&()>)
            .await?;
        Ok(resp.tasks.into_iter().next())
    }

    pub async fn update_task(&self, task_id: &str, status: TaskStatus) -> Result<(), LeoError> {
        let body = UpdateTaskRequest {
            task_id: task_id.to_string(),
            status,
        };
        let _: serde_json::Value = self
            .send(Method::PUT, "api/tasks", None::<&()>, Some(&body))
            .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_run(
        &self,
        run_id: &str,
        status: Option<RunStatus>,
        status_message: Option<String>,
        artifact_url: Option<String>,
        end_ts: Option<i64>,
    ) -> Result<(), LeoError> {
        let body = UpdateRunRequest {
            run_id: run_id.to_string(),
            status,
            status_message,
            artifact_url,
            end_ts,
            job_id: None,
            node_id: None,
            owner_id: None,
            start_ts: None,
        };
        let path = format!("api/runs/{run_id}");
        let _: serde_json::Value = self.send(Method::PUT, &path, None::<&()>, Some(&body)).await?;
        Ok(())
    }

    /// A run's first `update_run` call doubles as its creation — there is
    /// no separate create-run RPC. Used once per run, from DEPLOYING.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_run(
        &self,
        run_id: &str,
        job_id: &str,
        node_id: &str,
        owner_id: &str,
        start_ts: i64,
        status: RunStatus,
        status_message: Option<String>,
    ) -> Result<(), LeoError> {
        let body = UpdateRunRequest {
            run_id: run_id.to_string(),
            status: Some(status),
            status_message,
            artifact_url: None,
            end_ts: None,
            job_id: Some(job_id.to_string()),
            node_id: Some(node_id.to_string()),
            owner_id: Some(owner_id.to_string()),
            start_ts: Some(start_ts),
        };
        let path = format!("api/runs/{run_id}");
        let _: serde_json::Value = self.send(Method::PUT, &path, None::<&()>, Some(&body)).await?;
        Ok(())
    }
}

/// Equal-jitter backoff: `[base/2, base]`, deterministic per caller+attempt
/// so retries are reproducible in tests without depending on real entropy.
fn jittered_backoff(base: Duration, caller_id: &str, attempt: u32) -> Duration {
    if base.is_zero() {
        return base;
    }
    let half = base / 2;
    let half_ms = half.as_millis().min(u128::from(u64::MAX)) as u64;
    if half_ms == 0 {
        return base;
    }
    let seed =
        fnv1a64(caller_id.as_bytes()).wrapping_add(u64::from(attempt).wrapping_mul(0x9e37_79b9_7f4a_7c15));
    let jitter_ms = seed % (half_ms + 1);
    half + Duration::from_millis(jitter_ms)
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_backoff_is_deterministic_and_in_range() {
        let base = Duration::from_secs(2);
        let a = jittered_backoff(base, "node-1", 3);
        let b = jittered_backoff(base, "node-1", 3);
        assert_eq!(a, b);
        assert!(a >= base / 2 && a <= base);
    }

    #[test]
    fn jittered_backoff_differs_across_attempts() {
        let base = Duration::from_secs(4);
        let a1 = jittered_backoff(base, "node-1", 1);
        let a2 = jittered_backoff(base, "node-1", 2);
        assert_ne!(a1, a2);
    }
}
