use axum::Json;
use serde::Serialize;

pub mod config;
pub mod jobs;
pub mod kernel;
pub mod nodes;
pub mod runs;
pub mod scavenger;
pub mod tasks;
pub mod users;

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
