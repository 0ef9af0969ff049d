//! Receive-mode HTTP surface (§6): a deploy endpoint per artifact type, a
//! config-read endpoint, and two drop-health probes.

use crate::http_error::AppError;
use crate::poller::ReceiverPoller;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::store::DropStore;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Clone)]
pub struct HttpState {
    pub app: AppState,
    pub poller: Arc<ReceiverPoller>,
}

pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/config", get(read_config))
        .route("/health/drop/read", get(drop_health_read))
        .route("/health/drop/write", get(drop_health_write))
        .route("/jobs/{job_id}", get(get_job))
        .route("/deploy/image", post(deploy_now))
        .route("/deploy/package", post(deploy_now))
        .route("/deploy/model", post(deploy_now))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Manually triggers an immediate poll pass rather than waiting for the
/// next scheduled tick; grounded on the original's per-type deploy
/// handlers, which likewise process whatever job-meta is waiting.
async fn deploy_now(State(state): State<HttpState>) -> Json<serde_json::Value> {
    state.poller.poll_once().await;
    Json(json!({ "status": "triggered" }))
}

async fn health(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.app.start_time.elapsed().as_secs(),
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn read_config(State(state): State<HttpState>) -> Json<serde_json::Value> {
    Json(json!({
        "mode": "RECEIVE",
        "nfsPath": state.app.config.nfs_path,
        "pollIntervalSecs": state.app.config.poll_interval_secs,
    }))
}

async fn drop_health_read(State(state): State<HttpState>) -> Result<Json<serde_json::Value>, AppError> {
    state.app.store.list(".").await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn drop_health_write(State(state): State<HttpState>) -> Result<Json<serde_json::Value>, AppError> {
    let probe_name = ".health-probe";
    {
        let mut w = state.app.store.create_write(probe_name).await?;
        use tokio::io::AsyncWriteExt;
        w.write_all(b"ok").await.map_err(|e| anyhow::anyhow!(e))?;
    }
    state.app.store.remove(probe_name).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn get_job(
    State(state): State<HttpState>,
    axum::extract::Path(job_id): axum::extract::Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = state
        .app
        .registry
        .get(&job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
    Ok(Json(serde_json::to_value(job).map_err(|e| anyhow::anyhow!(e))?))
}
