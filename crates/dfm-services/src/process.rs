//! The Process service: HTTP ingress that validates a submitted `Process`,
//! persists its `RequestState`, and hands the resulting `Job` off to either the
//! `execute` or `scheduler` pubsub channel.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use dfm_core::{DfmError, Job, Process, RequestState};
use dfm_redis::{Channel, Conn, RequestStateStore};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{auth_context_middleware, require_auth_middleware, AuthState};
use crate::config::{AuthMethod, ProcessConfig};
use crate::error::ApiError;

const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    site_name: Arc<str>,
    store: Arc<RequestStateStore>,
    conn: Conn,
}

impl AppState {
    pub fn new(site_name: impl Into<Arc<str>>, conn: Conn) -> Self {
        AppState {
            site_name: site_name.into(),
            store: Arc::new(RequestStateStore::new(conn.clone())),
            conn,
        }
    }
}

/// Build the Process service's router, wired the same way `dashflow-registry`
/// layers its middleware: auth extraction/enforcement closest to the handlers,
/// request tracing outermost.
pub fn router(state: AppState, auth: AuthState) -> Router {
    let api = Router::new()
        .route("/status", get(status))
        .route("/version", get(version))
        .route("/process", post(submit_process))
        .route("/request/responses/:id", get(responses))
        .with_state(state)
        .layer(middleware::from_fn(require_auth_middleware))
        .layer(middleware::from_fn_with_state(auth, auth_context_middleware));

    api.layer(TraceLayer::new_for_http())
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({"status": "OK"}))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({"version": CRATE_VERSION, "name": CRATE_NAME}))
}

#[derive(Deserialize)]
pub struct ProcessQuery {
    #[serde(default)]
    mode: ProcessMode,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    #[default]
    Execute,
    Discovery,
}

async fn submit_process(
    State(state): State<AppState>,
    Query(query): Query<ProcessQuery>,
    Json(process): Json<Process>,
) -> Result<Response, ApiError> {
    // A deadline that failed to parse into `DateTime<FixedOffset>` never reaches
    // this handler as `process.deadline` — serde already rejected the body. The
    // remaining check here is the explicit invariant: a *present* deadline must
    // carry a zone, which `DateTime<FixedOffset>`'s own RFC 3339 parser already
    // enforces, so nothing further to check beyond successful deserialization.

    process.validate_local_refs().map_err(DfmError::from)?;

    let request_id = Uuid::new_v4();
    let request_state = RequestState::new(request_id, process.clone());
    state.store.persist(&request_state).await?;

    let job = Job {
        request_id,
        home_site: state.site_name.to_string(),
        deadline: process.deadline,
        execute: process.execute.clone(),
        is_discovery: query.mode == ProcessMode::Discovery,
    };

    let now = Utc::now().with_timezone(&chrono::FixedOffset::east_opt(0).unwrap());
    let channel = if job.due_immediately(now) {
        Channel::bind(state.conn.clone(), "ANY", "EXECUTE", "req", "process").await?
    } else {
        Channel::bind(state.conn.clone(), "ANY", "SCHEDULER", "req", "process").await?
    };

    let encoded = serde_json::to_string(&job).map_err(dfm_core::Error::from)?;
    channel.publish(&encoded).await?;

    info!(%request_id, discovery = job.is_discovery, "process accepted");
    Ok((StatusCode::OK, Json(json!({"request_id": request_id}))).into_response())
}

#[derive(Deserialize)]
pub struct ResponsesQuery {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    size: usize,
}

async fn responses(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResponsesQuery>,
) -> Result<Response, ApiError> {
    let loaded = state.store.load(id).await?;
    let request_state = match loaded {
        Some(state) => state,
        None => return Ok(StatusCode::NOT_FOUND.into_response()),
    };

    let slice = request_state.slice(query.index, query.size);
    if slice.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    match serde_json::to_value(slice) {
        Ok(body) => Ok((StatusCode::OK, Json(body)).into_response()),
        Err(e) => {
            warn!(error = %e, %id, "failed to encode response slice");
            Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()}))).into_response())
        }
    }
}

/// Convenience wired up by `bin/dfm-process.rs`: build the state + router from
/// configuration and run the server until ctrl-c.
pub async fn run(config: ProcessConfig) -> anyhow::Result<()> {
    let conn = Conn::connect(&config.redis.to_redis_config()).await?;
    let state = AppState::new(config.site_name.clone(), conn);
    let auth_state = AuthState { method: config.auth.method };
    let app = router(state, auth_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "dfm-process listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dfm_redis::RedisConfig;
    use tower::util::ServiceExt;

    async fn test_state() -> (AppState, AuthState) {
        let conn = Conn::connect(&RedisConfig::fake()).await.unwrap();
        (
            AppState::new("localhost", conn),
            AuthState { method: AuthMethod::Disabled },
        )
    }

    #[tokio::test]
    async fn status_reports_ok() {
        let (state, auth) = test_state().await;
        let app = router(state, auth);
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn version_reports_crate_name() {
        let (state, auth) = test_state().await;
        let app = router(state, auth);
        let request = Request::builder().uri("/version").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_request_id_is_404() {
        let (state, auth) = test_state().await;
        let app = router(state, auth);
        let request = Request::builder()
            .uri(format!("/request/responses/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn submitting_a_process_returns_a_request_id() {
        let (state, auth) = test_state().await;
        let app = router(state, auth);

        let body = serde_json::json!({
            "api_class": "dfm.api.Process",
            "site": "localhost",
            "deadline": null,
            "execute": {"site": null, "body": {}},
        });

        let request = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_response_log_is_204() {
        let (state, auth) = test_state().await;
        let app = router(state.clone(), auth);

        let body = serde_json::json!({
            "api_class": "dfm.api.Process",
            "site": "localhost",
            "deadline": null,
            "execute": {"site": null, "body": {}},
        });
        let request = Request::builder()
            .method("POST")
            .uri("/process")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let request_id = parsed["request_id"].as_str().unwrap();

        let request = Request::builder()
            .uri(format!("/request/responses/{request_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
