//! Job data model: status state machine, artifact descriptor, job-meta
//! wire format.

use serde::{Deserialize, Serialize};

/// Job status state machine. Transitions happen only in the pipeline
/// worker that owns the job, except `DownloadingDone -> Success`, which is
/// the reconciler's sole responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Downloading,
    DownloadingFailed,
    DownloadingDone,
    Chunked,
    ChunkDownloading,
    ChunkDone,
    ChunksMerging,
    ChunksMergeFailed,
    MetaWritingFailed,
    Success,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success
                | JobStatus::DownloadingFailed
                | JobStatus::MetaWritingFailed
                | JobStatus::ChunksMergeFailed
        )
    }
}

/// Tagged variant over the three artifact kinds the core relays. Adapters
/// for fetching/publishing each kind live at the edges (`sender::fetcher`,
/// `receiver::publisher`); the core only needs the tag and a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "artifactType")]
pub enum ArtifactDescriptor {
    #[serde(rename = "DOCKER")]
    Image { name: String },
    #[serde(rename = "PYPI")]
    Package { name: String, version: String },
    #[serde(rename = "HF")]
    Model { name: String },
}

impl ArtifactDescriptor {
    pub fn artifact_name(&self) -> &str {
        match self {
            ArtifactDescriptor::Image { name } => name,
            ArtifactDescriptor::Package { name, .. } => name,
            ArtifactDescriptor::Model { name } => name,
        }
    }
}

/// One end-to-end artifact transfer, uniquely identified within a drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub artifact: ArtifactDescriptor,
    pub status: JobStatus,
    pub status_dttm: chrono::DateTime<chrono::Utc>,
    pub artifact_path: Option<String>,
    pub is_chunked: bool,
    pub chunk_count: Option<usize>,
    pub total_size: Option<u64>,
    pub chunks: Vec<String>,
    pub md5_hash: Option<String>,
    pub sha256_hash: Option<String>,
}

impl Job {
    pub fn new(job_id: String, artifact: ArtifactDescriptor) -> Self {
        Job {
            job_id,
            artifact,
            status: JobStatus::Downloading,
            status_dttm: chrono::Utc::now(),
            artifact_path: None,
            is_chunked: false,
            chunk_count: None,
            total_size: None,
            chunks: Vec::new(),
            md5_hash: None,
            sha256_hash: None,
        }
    }

    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.status_dttm = chrono::Utc::now();
    }
}

/// Job id: a monotone, second-resolution timestamp string.
pub fn generate_job_id(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// The `<jobid>.job` wire format: a text-object with camelCase fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub artifact: String,
    pub artifact_type: String,
    pub path: Option<String>,
    pub status: JobStatus,
    pub status_dttm: chrono::DateTime<chrono::Utc>,
    pub is_chunked: bool,
    pub chunk_count: Option<usize>,
    pub total_size: Option<u64>,
    pub chunks: Vec<String>,
    pub md5_hash: Option<String>,
    pub sha256_hash: Option<String>,
}

impl From<&Job> for JobMeta {
    fn from(job: &Job) -> Self {
        let artifact_type = match &job.artifact {
            ArtifactDescriptor::Image { .. } => "DOCKER",
            ArtifactDescriptor::Package { .. } => "PYPI",
            ArtifactDescriptor::Model { .. } => "HF",
        };
        JobMeta {
            artifact: job.artifact.artifact_name().to_string(),
            artifact_type: artifact_type.to_string(),
            path: job.artifact_path.clone(),
            status: job.status,
            status_dttm: job.status_dttm,
            is_chunked: job.is_chunked,
            chunk_count: job.chunk_count,
            total_size: job.total_size,
            chunks: job.chunks.clone(),
            md5_hash: job.md5_hash.clone(),
            sha256_hash: job.sha256_hash.clone(),
        }
    }
}

impl JobMeta {
    pub fn job_meta_file_name(job_id: &str) -> String {
        format!("{job_id}.job")
    }

    pub async fn write(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, json).await
    }

    pub async fn read(path: &std::path::Path) -> crate::error::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let meta: JobMeta = serde_json::from_slice(&bytes)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_a_monotone_timestamp() {
        let t1 = chrono::Utc::now();
        let t2 = t1 + chrono::Duration::seconds(1);
        assert!(generate_job_id(t1) <= generate_job_id(t2));
    }

    #[test]
    fn job_meta_round_trips_through_json() {
        let job = Job::new(
            "20260101120000".to_string(),
            ArtifactDescriptor::Image {
                name: "alpine:latest".to_string(),
            },
        );
        let meta = JobMeta::from(&job);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"artifactType\":\"DOCKER\""));
        assert!(json.contains("\"isChunked\":false"));

        let reparsed: JobMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed.artifact, "alpine:latest");
    }

    #[test]
    fn terminal_states_are_exactly_the_four_named() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::DownloadingFailed.is_terminal());
        assert!(JobStatus::MetaWritingFailed.is_terminal());
        assert!(JobStatus::ChunksMergeFailed.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
        assert!(!JobStatus::DownloadingDone.is_terminal());
        assert!(!JobStatus::ChunkDone.is_terminal());
    }
}
