//! Error taxonomy shared by the sender and receiver pipelines.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("drop i/o failed: {0}")]
    DropIoFailed(String),

    #[error("out of space on drop")]
    OutOfSpace,

    #[error("manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// True if the underlying OS error looks like an out-of-space condition.
    /// Used by the sender pipeline's one-time chunking retry.
    pub fn is_out_of_space(io_err: &std::io::Error) -> bool {
        matches!(io_err.raw_os_error(), Some(28)) // ENOSPC
            || io_err.to_string().to_lowercase().contains("no space")
    }
}
