//! Receiver pipeline: a polling loop over the drop (§4.6).
//!
//! Grounded on `deploy/deploy-utils.go::LoadArtifacts`/`LoadArtifactsFs`
//! (poll-loop-over-`*.job`-entries shape) and `deploy/chank-utils.go`
//! (`TryProcessChunkedArtifact`'s manifest-location fallback,
//! `LoadChunkedFile`'s download-then-merge-then-delete-from-drop sequence).
//!
//! Unlike the original, which only wires SMB into the receive path and
//! leaves the local-FS variant as dead code, this implementation supports
//! both backends symmetrically, since the drop can be local NFS or SMB on
//! either side (§4.3).

use crate::publisher::ArtifactPublisher;
use crate::state::AppState;
use relay_core::error::Result;
use relay_core::fragment::{merge_fragments, Manifest};
use relay_core::job::{ArtifactDescriptor, Job, JobMeta, JobStatus};
use relay_core::store::DropStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct ReceiverPoller {
    pub state: AppState,
    pub publishers: HashMap<&'static str, Arc<dyn ArtifactPublisher>>,
}

impl ReceiverPoller {
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let interval = std::time::Duration::from_secs(self.state.config.poll_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.poll_once().await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    /// One pass over the drop's `*.job` entries, processed sequentially
    /// (§4.6 "Ordering guarantees": order between jobs is unspecified, but
    /// this implementation processes one poll pass in listing order).
    pub async fn poll_once(&self) {
        let entries = match self.state.store.list(".").await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "receiver poll: could not list drop");
                return;
            }
        };

        for entry in entries {
            if entry.is_dir || !entry.name.ends_with(".job") {
                continue;
            }
            self.process_job_meta(&entry.name).await;
        }
    }

    async fn process_job_meta(&self, file_name: &str) {
        let job_id = file_name.trim_end_matches(".job").to_string();

        // Step 1: read and decode; unparsable -> skip, do not delete (a
        // partial upload may still be in flight).
        let local_copy = match self.read_remote_to_temp(file_name).await {
            Ok(path) => path,
            Err(e) => {
                warn!(job_id, error = %e, "could not fetch job-meta, skipping this pass");
                return;
            }
        };
        let bytes = match tokio::fs::read(&local_copy).await {
            Ok(b) => b,
            Err(e) => {
                warn!(job_id, error = %e, "could not read fetched job-meta");
                return;
            }
        };
        let _ = tokio::fs::remove_file(&local_copy).await;

        let meta: JobMeta = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(job_id, error = %e, "job-meta unparsable, skipping (may be in-flight)");
                return;
            }
        };

        // Step 2: classify by artifact type tag.
        let artifact = match meta.artifact_type.as_str() {
            "DOCKER" => ArtifactDescriptor::Image {
                name: meta.artifact.clone(),
            },
            "PYPI" => ArtifactDescriptor::Package {
                name: meta.artifact.clone(),
                version: String::new(),
            },
            "HF" => ArtifactDescriptor::Model {
                name: meta.artifact.clone(),
            },
            other => {
                warn!(job_id, artifact_type = other, "unknown artifact type, skipping");
                return;
            }
        };

        let mut job = self.state.registry.get(&job_id).await.unwrap_or_else(|| {
            let mut j = Job::new(job_id.clone(), artifact.clone());
            j.status = meta.status;
            j
        });

        let publisher = match self.publishers.get(meta.artifact_type.as_str()) {
            Some(p) => p.clone(),
            None => {
                warn!(job_id, artifact_type = %meta.artifact_type, "no publisher configured, skipping");
                return;
            }
        };

        let scratch_dir = std::env::temp_dir().join(format!("relay-receive-{job_id}"));
        let _ = tokio::fs::create_dir_all(&scratch_dir).await;

        let local_artifact_path = if meta.is_chunked {
            // Step 3: locate the manifest before doing anything else. If
            // it's absent at both candidate locations, this may be a
            // partial upload still in flight (or, per S6, a receiver crash
            // that already deleted fragments/manifest but not the
            // job-meta) — skip without touching status or drop files.
            let location = match self.locate_manifest(&job_id, &meta).await {
                Ok(Some(loc)) => loc,
                Ok(None) => {
                    warn!(job_id, "manifest not found at either location, skipping (may be in-flight)");
                    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                    return;
                }
                Err(e) => {
                    warn!(job_id, error = %e, "could not check manifest location, retrying next pass");
                    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                    return;
                }
            };

            match self
                .reassemble_chunked(&job_id, &meta, &location, &scratch_dir)
                .await
            {
                Ok(path) => path,
                Err(e) => {
                    error!(job_id, error = %e, "chunk reassembly failed");
                    job.transition(JobStatus::ChunksMergeFailed);
                    self.state.registry.insert(job).await;
                    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                    return;
                }
            }
        } else {
            match self.fetch_monolithic(&meta, &scratch_dir).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(job_id, error = %e, "could not fetch monolithic artifact, retrying next pass");
                    let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                    return;
                }
            }
        };

        // Step 5: hand the file to the publisher.
        match publisher.publish(&local_artifact_path).await {
            Ok(()) => {
                info!(job_id, "published successfully, committing drop cleanup");
                if let Err(e) = publisher.deploy_cleanup().await {
                    warn!(job_id, error = %e, "deploy_cleanup failed, continuing");
                }
                self.commit_cleanup(&job_id, &meta).await;
                job.transition(JobStatus::Success);
                self.state.registry.insert(job).await;
            }
            Err(e) => {
                // Step 6: leave drop files in place; next poll retries.
                warn!(job_id, error = %e, "publish failed, leaving drop files for retry");
            }
        }

        let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
    }

    /// Step 3: locate the manifest, next to the job-meta first, else in the
    /// per-job `chunks_<jobid>` subdirectory. Returns `None` when absent at
    /// both — the caller treats that as "possibly in flight" and skips.
    async fn locate_manifest(
        &self,
        job_id: &str,
        meta: &JobMeta,
    ) -> Result<Option<(String, String)>> {
        let chunks_dir_name = format!("chunks_{job_id}");
        let manifest_name = format!("{}.manifest", meta.artifact);

        if self.state.store.stat(&manifest_name).await?.is_some() {
            return Ok(Some((manifest_name, String::new())));
        }

        let chunked_manifest_path = format!("{chunks_dir_name}/{manifest_name}");
        if self.state.store.stat(&chunked_manifest_path).await?.is_some() {
            return Ok(Some((chunked_manifest_path, chunks_dir_name)));
        }

        Ok(None)
    }

    async fn reassemble_chunked(
        &self,
        job_id: &str,
        meta: &JobMeta,
        (manifest_remote_path, fragments_remote_dir): &(String, String),
        scratch_dir: &Path,
    ) -> Result<std::path::PathBuf> {
        self.state
            .registry
            .set_status(job_id, JobStatus::ChunksMerging)
            .await;

        let manifest_name = format!("{}.manifest", meta.artifact);

        // Step 4: copy manifest and fragments to a local scratch directory.
        let manifest_bytes = self.read_remote_bytes(manifest_remote_path).await?;
        let manifest_local = scratch_dir.join(&manifest_name);
        tokio::fs::write(&manifest_local, &manifest_bytes).await?;

        let manifest: Manifest = Manifest::read(&manifest_local).await?;
        for fragment in &manifest.fragments {
            let remote_path = if fragments_remote_dir.is_empty() {
                fragment.file_name.clone()
            } else {
                format!("{fragments_remote_dir}/{}", fragment.file_name)
            };
            let bytes = self.read_remote_bytes(&remote_path).await?;
            tokio::fs::write(scratch_dir.join(&fragment.file_name), bytes).await?;
        }

        let merged_dir = scratch_dir.join("merged");
        let merged_path = merge_fragments(&manifest_local, &merged_dir).await?;
        Ok(merged_path)
    }

    async fn fetch_monolithic(
        &self,
        meta: &JobMeta,
        scratch_dir: &Path,
    ) -> Result<std::path::PathBuf> {
        let remote_path = meta.path.clone().unwrap_or_else(|| meta.artifact.clone());
        let bytes = self.read_remote_bytes(&remote_path).await?;
        let local_path = scratch_dir.join(&meta.artifact);
        tokio::fs::write(&local_path, bytes).await?;
        Ok(local_path)
    }

    /// Step 5 commit: remove artifact file, manifest, all fragments, and
    /// finally the job-meta. Job-meta removal is the single commit point
    /// that signals success to the sender.
    async fn commit_cleanup(&self, job_id: &str, meta: &JobMeta) {
        if meta.is_chunked {
            let chunks_dir_name = format!("chunks_{job_id}");
            let manifest_name = format!("{}.manifest", meta.artifact);
            for chunk in &meta.chunks {
                let _ = self
                    .state
                    .store
                    .remove(&format!("{chunks_dir_name}/{chunk}"))
                    .await;
            }
            let _ = self
                .state
                .store
                .remove(&format!("{chunks_dir_name}/{manifest_name}"))
                .await;
            let _ = self.state.store.remove(&manifest_name).await;
        } else if let Some(path) = &meta.path {
            let _ = self.state.store.remove(path).await;
        }

        let job_meta_name = JobMeta::job_meta_file_name(job_id);
        if let Err(e) = self.state.store.remove(&job_meta_name).await {
            error!(job_id, error = %e, "failed to remove job-meta, commit point not reached");
        }
    }

    async fn read_remote_bytes(&self, path: &str) -> Result<Vec<u8>> {
        use tokio::io::AsyncReadExt;
        let mut reader = self.state.store.open_read(path).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn read_remote_to_temp(&self, path: &str) -> Result<std::path::PathBuf> {
        let bytes = self.read_remote_bytes(path).await?;
        let temp = std::env::temp_dir().join(format!("relay-jobmeta-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp, bytes).await?;
        Ok(temp)
    }
}
