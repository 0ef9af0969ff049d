//! Send-mode HTTP surface (§6): one start endpoint per artifact type, job
//! status by id/latest, a config-read endpoint, and two drop-health probes.

use crate::fetcher::{ArtifactFetcher, ImageFetcher, ModelFetcher, PackageFetcher};
use crate::http_error::AppError;
use crate::pipeline::SenderPipeline;
use crate::state::AppState;
use axum::extract::{Path as AxumPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::job::{generate_job_id, ArtifactDescriptor};
use relay_core::store::DropStore;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/config", get(read_config))
        .route("/health/drop/read", get(drop_health_read))
        .route("/health/drop/write", get(drop_health_write))
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/latest", get(get_latest_job))
        .route("/jobs/image/start", post(start_image))
        .route("/jobs/package/start", post(start_package))
        .route("/jobs/model/start", post(start_model))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.start_time.elapsed().as_secs(),
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn read_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "mode": "SEND",
        "nfsPath": state.config.nfs_path,
        "chunkSize": state.config.chunk_size,
        "bufferSize": state.config.buffer_size,
        "enableChunking": state.config.enable_chunking,
    }))
}

/// Drop-health probe: can we read the configured drop directory? Ported
/// from `common/common.go::CheckNfsStorageForReading`.
async fn drop_health_read(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.list(".").await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// Drop-health probe: can we write to the configured drop directory? Ported
/// from `common/common.go::CheckNfsStorageForWriting`.
async fn drop_health_write(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let probe_name = ".health-probe";
    {
        let mut w = state.store.create_write(probe_name).await?;
        use tokio::io::AsyncWriteExt;
        w.write_all(b"ok").await.map_err(|e| anyhow::anyhow!(e))?;
    }
    state.store.remove(probe_name).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn get_job(
    State(state): State<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let job = state
        .registry
        .get(&job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
    Ok(Json(serde_json::to_value(job).map_err(|e| anyhow::anyhow!(e))?))
}

async fn get_latest_job(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let job = state
        .registry
        .get_latest()
        .await
        .ok_or_else(|| AppError::NotFound("no jobs submitted yet".into()))?;
    Ok(Json(serde_json::to_value(job).map_err(|e| anyhow::anyhow!(e))?))
}

#[derive(Deserialize)]
struct StartImageRequest {
    image: String,
}

async fn start_image(
    State(state): State<AppState>,
    Json(req): Json<StartImageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.config.send_docker.enabled {
        return Err(AppError::BadRequest("docker sending is not enabled".into()));
    }
    let job_id = generate_job_id(chrono::Utc::now());
    let descriptor = ArtifactDescriptor::Image {
        name: req.image.clone(),
    };
    let fetcher: Box<dyn ArtifactFetcher> = Box::new(ImageFetcher {
        image_name: req.image,
    });
    spawn_job(state, job_id.clone(), descriptor, fetcher);
    Ok(Json(json!({ "jobId": job_id })))
}

#[derive(Deserialize)]
struct StartPackageRequest {
    package: String,
    version: String,
}

async fn start_package(
    State(state): State<AppState>,
    Json(req): Json<StartPackageRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cfg = &state.config.send_pypi;
    if !cfg.enabled {
        return Err(AppError::BadRequest("pypi sending is not enabled".into()));
    }
    let job_id = generate_job_id(chrono::Utc::now());
    let descriptor = ArtifactDescriptor::Package {
        name: req.package.clone(),
        version: req.version.clone(),
    };
    let fetcher: Box<dyn ArtifactFetcher> = Box::new(PackageFetcher {
        package_name: req.package,
        version: req.version,
        nexus_url: cfg.nexus_url.clone().unwrap_or_default(),
        repo: cfg.repo.clone().unwrap_or_default(),
        login: cfg.login.clone().unwrap_or_default(),
        password: cfg.password.clone().unwrap_or_default(),
        client: reqwest::Client::new(),
    });
    spawn_job(state, job_id.clone(), descriptor, fetcher);
    Ok(Json(json!({ "jobId": job_id })))
}

#[derive(Deserialize)]
struct StartModelRequest {
    model: String,
}

async fn start_model(
    State(state): State<AppState>,
    Json(req): Json<StartModelRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cfg = &state.config.send_hf;
    if !cfg.enabled {
        return Err(AppError::BadRequest("hf sending is not enabled".into()));
    }
    let job_id = generate_job_id(chrono::Utc::now());
    let descriptor = ArtifactDescriptor::Model {
        name: req.model.clone(),
    };
    let fetcher: Box<dyn ArtifactFetcher> = Box::new(ModelFetcher {
        model_name: req.model,
        nexus_url: cfg.nexus_url.clone().unwrap_or_default(),
        repo: cfg.repo.clone().unwrap_or_default(),
        login: cfg.login.clone().unwrap_or_default(),
        password: cfg.password.clone().unwrap_or_default(),
        client: reqwest::Client::new(),
    });
    spawn_job(state, job_id.clone(), descriptor, fetcher);
    Ok(Json(json!({ "jobId": job_id })))
}

fn spawn_job(
    state: AppState,
    job_id: String,
    descriptor: ArtifactDescriptor,
    fetcher: Box<dyn ArtifactFetcher>,
) {
    tokio::spawn(async move {
        let pipeline = SenderPipeline::new(state);
        pipeline.run(job_id, descriptor, fetcher).await;
    });
}
