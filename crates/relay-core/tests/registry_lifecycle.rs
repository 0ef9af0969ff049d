//! Integration coverage for the job registry's testable properties (§8):
//! state-machine exhaustiveness and the staleness reaper.

use relay_core::job::{ArtifactDescriptor, Job, JobStatus};
use relay_core::registry::JobRegistry;
use relay_core::store::local::LocalDropStore;
use tempfile::TempDir;

fn image_job(id: &str) -> Job {
    Job::new(
        id.to_string(),
        ArtifactDescriptor::Image {
            name: "alpine:latest".to_string(),
        },
    )
}

/// Property 4: every path from `DOWNLOADING` terminates in exactly one of
/// `{SUCCESS, DOWNLOADING_FAILED, META_WRITING_FAILED, CHUNKS_MERGE_FAILED}`.
/// `CHUNK_DONE` is a legitimate non-terminal resting state for the sender
/// side of a chunked job (§3) — it is not itself terminal.
#[test]
fn terminal_set_matches_spec_exactly() {
    use JobStatus::*;
    let terminal: Vec<JobStatus> = vec![Success, DownloadingFailed, MetaWritingFailed, ChunksMergeFailed];
    let non_terminal: Vec<JobStatus> = vec![
        Downloading,
        DownloadingDone,
        Chunked,
        ChunkDownloading,
        ChunkDone,
        ChunksMerging,
    ];

    for status in &terminal {
        assert!(status.is_terminal(), "{status:?} must be terminal");
    }
    for status in &non_terminal {
        assert!(!status.is_terminal(), "{status:?} must not be terminal");
    }
    assert_eq!(terminal.len() + non_terminal.len(), 10, "all 10 states covered");
}

#[tokio::test]
async fn reconciler_only_advances_downloading_done_jobs() {
    let dir = TempDir::new().unwrap();
    let store = LocalDropStore::new(dir.path());
    let registry = JobRegistry::new();

    let mut still_downloading = image_job("20260101000010");
    still_downloading.transition(JobStatus::Downloading);
    registry.insert(still_downloading).await;

    let mut chunk_done = image_job("20260101000011");
    chunk_done.transition(JobStatus::ChunkDone);
    registry.insert(chunk_done).await;

    let mut ready = image_job("20260101000012");
    ready.transition(JobStatus::DownloadingDone);
    registry.insert(ready).await;

    registry.reconcile_once(&store).await;

    assert_eq!(
        registry.get("20260101000010").await.unwrap().status,
        JobStatus::Downloading,
        "reconciler never touches jobs outside DOWNLOADING_DONE"
    );
    assert_eq!(
        registry.get("20260101000011").await.unwrap().status,
        JobStatus::ChunkDone,
        "CHUNK_DONE reaches SUCCESS via the receiver's registry, not the sender's reconciler"
    );
    assert_eq!(
        registry.get("20260101000012").await.unwrap().status,
        JobStatus::Success
    );
}

/// Property 6: any job whose last timestamp is > 7 days is absent from the
/// registry after one reaper pass, regardless of its status.
#[tokio::test]
async fn reaper_sweeps_stale_jobs_in_every_status() {
    let registry = JobRegistry::new();
    let stale_cutoff = chrono::Utc::now() - chrono::Duration::days(8);

    for (i, status) in [
        JobStatus::Downloading,
        JobStatus::ChunkDone,
        JobStatus::Success,
        JobStatus::DownloadingFailed,
    ]
    .into_iter()
    .enumerate()
    {
        let mut job = image_job(&format!("2020010100{i:04}"));
        job.transition(status);
        job.status_dttm = stale_cutoff;
        registry.insert(job).await;
    }

    let mut fresh = image_job("20260101999999");
    fresh.transition(JobStatus::Downloading);
    registry.insert(fresh).await;

    registry.reap_stale_once().await;

    let remaining = registry.snapshot().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].job_id, "20260101999999");
}
