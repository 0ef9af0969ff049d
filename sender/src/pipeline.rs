//! Sender pipeline orchestration (§4.5).
//!
//! Grounded on the original implementation's `deliver/deliver-utils.go`:
//! `startCd`'s free-space check / monolithic-copy-with-rename /
//! fallback-to-chunking sequence, and `downloadWithChunking`'s
//! tee-to-scratch-file SHA-256 computation.

use crate::fetcher::ArtifactFetcher;
use crate::state::AppState;
use relay_core::error::{RelayError, Result};
use relay_core::fragment::{manifest::manifest_path_for, split_stream};
use relay_core::job::{ArtifactDescriptor, Job, JobMeta, JobStatus};
use relay_core::store::DropStore;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

pub struct SenderPipeline {
    pub state: AppState,
}

impl SenderPipeline {
    pub fn new(state: AppState) -> Self {
        SenderPipeline { state }
    }

    /// Runs one job to a terminal state, per §4.5 steps 1-6.
    pub async fn run(
        &self,
        job_id: String,
        artifact: ArtifactDescriptor,
        fetcher: Box<dyn ArtifactFetcher>,
    ) {
        let mut job = Job::new(job_id.clone(), artifact);
        self.state.registry.insert(job.clone()).await;
        info!(job_id, "entering DOWNLOADING");

        let (suggested_name, stream) = match fetcher.fetch().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(job_id, error = %e, "upstream fetch failed");
                self.state
                    .registry
                    .set_status(&job_id, JobStatus::DownloadingFailed)
                    .await;
                return;
            }
        };

        let config = self.state.config.clone();
        let buffer_size = config.buffer_size_bytes().unwrap_or(5 * 1024 * 1024);
        let chunk_size = config.chunk_size_bytes().unwrap_or(50 * 1024 * 1024);
        let threshold = config.chunking_threshold_bytes().unwrap_or(100 * 1024 * 1024);

        let force_chunking = if config.enable_chunking {
            match self.state.store.free_space().await {
                Ok(Some(free)) => free < threshold,
                _ => false,
            }
        } else {
            false
        };

        let result = if !config.enable_chunking {
            self.run_monolithic(&job_id, &suggested_name, stream, buffer_size)
                .await
        } else if force_chunking {
            info!(job_id, "free space below threshold, chunking immediately");
            self.run_chunking(&job_id, &suggested_name, stream, chunk_size)
                .await
        } else {
            match self
                .run_monolithic(&job_id, &suggested_name, stream, buffer_size)
                .await
            {
                Err(RelayError::OutOfSpace) => {
                    warn!(job_id, "monolithic write hit out-of-space, no retry available: source stream already consumed");
                    Err(RelayError::OutOfSpace)
                }
                other => other,
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = fetcher.deliver_cleanup().await {
                    warn!(job_id, error = %e, "deliver_cleanup failed, continuing");
                }
                job = self.state.registry.get(&job_id).await.unwrap_or(job);
                self.write_job_meta(&job).await;
            }
            Err(e) => {
                error!(job_id, error = %e, "sender pipeline failed");
                // Any I/O failure that reaches here without having already
                // moved the job to a terminal state (e.g. OutOfSpace on the
                // monolithic path, which cannot retry once the source
                // stream is consumed) must still land on DOWNLOADING_FAILED
                // per §4.4/§8 property 4 — no path may leave a job stuck in
                // DOWNLOADING indefinitely.
                let still_open = self
                    .state
                    .registry
                    .get(&job_id)
                    .await
                    .map(|j| !j.status.is_terminal())
                    .unwrap_or(false);
                if still_open {
                    self.state
                        .registry
                        .set_status(&job_id, JobStatus::DownloadingFailed)
                        .await;
                }
            }
        }
    }

    async fn run_monolithic<R: tokio::io::AsyncRead + Unpin>(
        &self,
        job_id: &str,
        suggested_name: &str,
        mut stream: R,
        buffer_size: u64,
    ) -> Result<()> {
        let tmp_name = format!("{job_id}.tmp");
        {
            let mut writer = self.state.store.create_write(&tmp_name).await?;
            let mut buf = vec![0u8; buffer_size as usize];
            loop {
                use tokio::io::AsyncReadExt;
                let n = match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        let _ = self.state.store.remove(&tmp_name).await;
                        if RelayError::is_out_of_space(&e) {
                            return Err(RelayError::OutOfSpace);
                        }
                        self.state
                            .registry
                            .set_status(job_id, JobStatus::DownloadingFailed)
                            .await;
                        return Err(RelayError::Io(e));
                    }
                };
                if let Err(e) = writer.write_all(&buf[..n]).await {
                    let _ = self.state.store.remove(&tmp_name).await;
                    self.state
                        .registry
                        .set_status(job_id, JobStatus::DownloadingFailed)
                        .await;
                    return Err(RelayError::Io(e));
                }
            }
            writer.flush().await.map_err(RelayError::Io)?;
        }

        self.state.store.rename(&tmp_name, suggested_name).await?;
        self.state
            .registry
            .update(job_id, |job| {
                job.artifact_path = Some(suggested_name.to_string());
                job.transition(JobStatus::DownloadingDone);
            })
            .await;
        info!(job_id, "monolithic transfer complete");
        Ok(())
    }

    async fn run_chunking<R: tokio::io::AsyncRead + Unpin>(
        &self,
        job_id: &str,
        suggested_name: &str,
        stream: R,
        chunk_size: u64,
    ) -> Result<()> {
        self.state
            .registry
            .set_status(job_id, JobStatus::Chunked)
            .await;

        let chunks_dir_name = format!("chunks_{job_id}");
        let local_scratch = std::env::temp_dir().join(&chunks_dir_name);

        self.state
            .registry
            .set_status(job_id, JobStatus::ChunkDownloading)
            .await;

        let manifest = split_stream(stream, &local_scratch, chunk_size, suggested_name).await?;

        // Mirror split fragments and manifest onto the drop.
        for fragment in &manifest.fragments {
            let local_path = local_scratch.join(&fragment.file_name);
            let bytes = tokio::fs::read(&local_path).await?;
            let drop_path = format!("{chunks_dir_name}/{}", fragment.file_name);
            let mut writer = self.state.store.create_write(&drop_path).await?;
            writer.write_all(&bytes).await.map_err(RelayError::Io)?;
            writer.flush().await.map_err(RelayError::Io)?;
        }
        let manifest_local_path = manifest_path_for(&local_scratch, suggested_name);
        let manifest_bytes = tokio::fs::read(&manifest_local_path).await?;
        let manifest_drop_path = format!(
            "{chunks_dir_name}/{}",
            manifest_local_path.file_name().unwrap().to_string_lossy()
        );
        {
            let mut writer = self.state.store.create_write(&manifest_drop_path).await?;
            writer.write_all(&manifest_bytes).await.map_err(RelayError::Io)?;
            writer.flush().await.map_err(RelayError::Io)?;
        }

        let _ = tokio::fs::remove_dir_all(&local_scratch).await;

        self.state
            .registry
            .update(job_id, |job| {
                job.artifact_path = Some(chunks_dir_name.clone());
                job.is_chunked = true;
                job.chunk_count = Some(manifest.fragment_count);
                job.total_size = Some(manifest.total_size);
                job.chunks = manifest.fragments.iter().map(|f| f.file_name.clone()).collect();
                job.md5_hash = manifest.md5_hash.clone();
                job.sha256_hash = manifest.sha256_hash.clone();
                // Terminal state for the chunking path is CHUNK_DONE; unlike
                // the monolithic path, SUCCESS is reached on the receiver's
                // own registry (CHUNK_DONE -> CHUNKS_MERGING -> SUCCESS),
                // not via this sender's reconciler (§3, §4.4).
                job.transition(JobStatus::ChunkDone);
            })
            .await;

        info!(job_id, fragments = manifest.fragment_count, "chunked transfer complete");
        Ok(())
    }

    async fn write_job_meta(&self, job: &Job) {
        let meta = JobMeta::from(job);
        let file_name = JobMeta::job_meta_file_name(&job.job_id);
        let json = match serde_json::to_vec_pretty(&meta) {
            Ok(j) => j,
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "failed to serialize job-meta");
                self.state
                    .registry
                    .set_status(&job.job_id, JobStatus::MetaWritingFailed)
                    .await;
                return;
            }
        };

        match self.state.store.create_write(&file_name).await {
            Ok(mut writer) => {
                if let Err(e) = writer.write_all(&json).await {
                    error!(job_id = %job.job_id, error = %e, "failed to write job-meta");
                    self.state
                        .registry
                        .set_status(&job.job_id, JobStatus::MetaWritingFailed)
                        .await;
                }
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "failed to open job-meta for write");
                self.state
                    .registry
                    .set_status(&job.job_id, JobStatus::MetaWritingFailed)
                    .await;
            }
        }
    }
}
