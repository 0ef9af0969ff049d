//! Job Registry: process-local job id -> status map with reader-writer
//! discipline, plus the two background workers.

use crate::job::{Job, JobStatus};
use crate::store::DropStore;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const RECONCILE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(15);
const REAP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);
const STALE_AFTER: i64 = 7; // days

/// Queries (reads) never block each other; writes exclude all readers and
/// writers — a single global lock rather than a sharded map.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, job: Job) {
        self.inner.write().await.insert(job.job_id.clone(), job);
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.read().await.get(job_id).cloned()
    }

    pub async fn get_latest(&self) -> Option<Job> {
        self.inner
            .read()
            .await
            .values()
            .max_by_key(|j| j.status_dttm)
            .cloned()
    }

    pub async fn snapshot(&self) -> Vec<Job> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn set_status(&self, job_id: &str, status: JobStatus) {
        if let Some(job) = self.inner.write().await.get_mut(job_id) {
            job.transition(status);
        }
    }

    pub async fn update<F: FnOnce(&mut Job)>(&self, job_id: &str, f: F) {
        if let Some(job) = self.inner.write().await.get_mut(job_id) {
            f(job);
        }
    }

    /// The sole mechanism by which `Success` is reached on the sender:
    /// for each job in `DownloadingDone`, check whether its job-meta still
    /// exists on the drop; if not, the receiver consumed it.
    pub async fn reconcile_once(&self, store: &dyn DropStore) {
        let candidates: Vec<String> = {
            let jobs = self.inner.read().await;
            jobs.values()
                .filter(|j| j.status == JobStatus::DownloadingDone)
                .map(|j| j.job_id.clone())
                .collect()
        };

        for job_id in candidates {
            let meta_path = crate::job::JobMeta::job_meta_file_name(&job_id);
            match store.stat(&meta_path).await {
                Ok(None) => {
                    self.set_status(&job_id, JobStatus::Success).await;
                    info!(job_id, "job-meta consumed by receiver, transitioning to SUCCESS");
                }
                Ok(Some(_)) => {}
                Err(e) => warn!(job_id, error = %e, "reconciler could not stat job-meta"),
            }
        }
    }

    /// Jobs whose `status_dttm` is older than 7 days are removed
    /// regardless of state.
    pub async fn reap_stale_once(&self) {
        let cutoff = chrono::Utc::now() - Duration::days(STALE_AFTER);
        let mut jobs = self.inner.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.status_dttm >= cutoff);
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "staleness reaper removed expired jobs");
        }
    }

    pub fn spawn_reconciler(
        self,
        store: Arc<dyn DropStore>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RECONCILE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.reconcile_once(store.as_ref()).await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }

    pub fn spawn_reaper(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.reap_stale_once().await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ArtifactDescriptor;
    use crate::store::local::LocalDropStore;
    use tempfile::TempDir;

    fn sample_job(id: &str) -> Job {
        Job::new(
            id.to_string(),
            ArtifactDescriptor::Image {
                name: "alpine:latest".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn reconcile_transitions_when_job_meta_gone() {
        let dir = TempDir::new().unwrap();
        let store = LocalDropStore::new(dir.path());
        let registry = JobRegistry::new();

        let mut job = sample_job("20260101000000");
        job.transition(JobStatus::DownloadingDone);
        registry.insert(job).await;

        // No job-meta file written: reconciler should flip to Success.
        registry.reconcile_once(&store).await;
        let job = registry.get("20260101000000").await.unwrap();
        assert_eq!(job.status, JobStatus::Success);
    }

    #[tokio::test]
    async fn reconcile_leaves_job_when_meta_still_present() {
        use tokio::io::AsyncWriteExt;

        let dir = TempDir::new().unwrap();
        let store = LocalDropStore::new(dir.path());
        let registry = JobRegistry::new();

        let mut job = sample_job("20260101000001");
        job.transition(JobStatus::DownloadingDone);
        registry.insert(job).await;

        {
            use crate::store::DropStore as _;
            let mut w = store.create_write("20260101000001.job").await.unwrap();
            w.write_all(b"{}").await.unwrap();
        }

        registry.reconcile_once(&store).await;
        let job = registry.get("20260101000001").await.unwrap();
        assert_eq!(job.status, JobStatus::DownloadingDone);
    }

    #[tokio::test]
    async fn reaper_removes_stale_jobs_regardless_of_state() {
        let registry = JobRegistry::new();
        let mut job = sample_job("20200101000000");
        job.status_dttm = chrono::Utc::now() - Duration::days(10);
        registry.insert(job).await;

        registry.reap_stale_once().await;
        assert!(registry.get("20200101000000").await.is_none());
    }

    #[tokio::test]
    async fn reaper_keeps_fresh_jobs() {
        let registry = JobRegistry::new();
        registry.insert(sample_job("20260101000002")).await;

        registry.reap_stale_once().await;
        assert!(registry.get("20260101000002").await.is_some());
    }
}
