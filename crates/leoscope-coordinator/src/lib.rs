use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::SqlitePool;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use leoscope_config::Config;

pub mod admission;
pub mod auth;
pub mod error;
mod http;
pub mod retention;

use admission::AdmissionGate;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SqlitePool,
    pub admission: AdmissionGate,
}

pub fn router(state: AppState) -> Router {
    error::set_debug_errors(state.config.debug_errors);

    let request_id_header = axum::http::HeaderName::from_static("x-request-id");
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|v| v.header_value().to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "http.request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        });

    Router::new()
        .route("/api/health", get(http::health))
        .route(
            "/api/users",
            post(http::users::register_user),
        )
        .route(
            "/api/users/{id}",
            axum::routing::put(http::users::modify_user).delete(http::users::delete_user),
        )
        .route(
            "/api/nodes",
            get(http::nodes::get_nodes).post(http::nodes::register_node),
        )
        .route(
            "/api/nodes/{id}",
            axum::routing::put(http::nodes::update_node).delete(http::nodes::delete_node),
        )
        .route("/api/nodes/{id}/heartbeat", post(http::nodes::report_heartbeat))
        .route(
            "/api/nodes/{id}/scavenger",
            get(http::scavenger::get_scavenger).post(http::scavenger::set_scavenger),
        )
        .route(
            "/api/jobs",
            get(http::jobs::get_jobs).post(http::jobs::schedule_job),
        )
        .route(
            "/api/jobs/{id}",
            get(http::jobs::get_job_by_id).delete(http::jobs::delete_job_by_id),
        )
        .route(
            "/api/jobs/{id}/reschedule",
            post(http::jobs::reschedule_job_nearest),
        )
        .route("/api/runs", get(http::runs::get_runs))
        .route("/api/runs/scheduled", get(http::runs::get_scheduled_runs))
        .route("/api/runs/{id}", axum::routing::put(http::runs::update_run))
        .route(
            "/api/tasks",
            get(http::tasks::get_tasks)
                .post(http::tasks::schedule_task)
                .put(http::tasks::update_task),
        )
        .route(
            "/api/config",
            get(http::config::get_config).post(http::config::update_global_config),
        )
        .route("/api/kernel-access", post(http::kernel::kernel_access))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_state() -> (AppState, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = leoscope_storage::db::init(tmp.path()).await.unwrap();
        let config = Config::for_tests(tmp.path());
        (
            AppState {
                config: Arc::new(config),
                db,
                admission: AdmissionGate::default(),
            },
            tmp,
        )
    }

    #[tokio::test]
    async fn health_is_reachable_without_credentials() {
        let (state, _tmp) = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_without_credentials_is_unauthenticated() {
        let (state, _tmp) = test_state().await;
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/nodes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
