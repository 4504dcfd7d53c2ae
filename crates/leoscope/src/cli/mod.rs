//! Administrative CLI surface: `user`, `node`, `job`, `run`, `config`
//! subcommands, each speaking the coordinator's RPC surface directly over
//! `reqwest` rather than going through a node agent. One-shot calls, no
//! retry loop — a human is waiting on the result.

pub mod config;
pub mod job;
pub mod node;
pub mod run;
pub mod user;

use serde::Serialize;
use serde::de::DeserializeOwned;

use leoscope_core::wire::ErrorBody;

/// Coordinator connection + credentials shared by every resource
/// subcommand, built once in `main` from `--coordinator-url`/env.
#[derive(Debug, Clone)]
pub struct Connection {
    pub base_url: reqwest::Url,
    pub user_id: String,
    pub access_token: String,
}

/// Maps to the CLI's exit-code contract: 1 on a domain error the
/// coordinator rejected the request for, 2 on a transport failure, 3 on
/// bad input caught before a call was even made.
#[derive(Debug)]
pub enum CliError {
    Domain(String),
    Transport(String),
    BadInput(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Domain(_) => 1,
            CliError::Transport(_) => 2,
            CliError::BadInput(_) => 3,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Domain(m) | CliError::Transport(m) | CliError::BadInput(m) => write!(f, "{m}"),
        }
    }
}

pub async fn call<Q, J, Resp>(
    conn: &Connection,
    method: reqwest::Method,
    path: &str,
    query: Option<&Q>,
    json: Option<&J>,
) -> Result<Resp, CliError>
where
    Q: Serialize,
    J: Serialize,
    Resp: DeserializeOwned,
{
    let url = conn
        .base_url
        .join(path)
        .map_err(|e| CliError::BadInput(format!("invalid path {path}: {e}")))?;

    let client = reqwest::Client::new();
    let mut req = client
        .request(method, url)
        .header("x-userid", &conn.user_id)
        .header("x-access-token", &conn.access_token);
    if let Some(q) = query {
        req = req.query(q);
    }
    if let Some(body) = json {
        req = req.json(body);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| CliError::Transport(format!("request failed: {e}")))?;

    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<Resp>()
            .await
            .map_err(|e| CliError::Transport(format!("failed to decode response: {e}")));
    }
    match resp.json::<ErrorBody>().await {
        Ok(body) => Err(CliError::Domain(format!("{:?}: {}", body.code, body.message))),
        Err(_) => Err(CliError::Transport(format!("coordinator returned HTTP {status}"))),
    }
}

pub fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("failed to render response as JSON: {e}"),
    }
}
