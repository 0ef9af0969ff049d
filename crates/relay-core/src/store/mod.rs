//! Drop Store: the shared-filesystem abstraction both sender and receiver
//! use to talk to the drop.

pub mod local;
#[cfg(feature = "smb")]
pub mod smb;

use crate::error::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// A minimal filesystem capability over the shared drop medium. All paths
/// are POSIX-style, relative to a share root configured at startup.
#[async_trait]
pub trait DropStore: Send + Sync {
    async fn open_read(&self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>>;

    async fn create_write(&self, path: &str) -> Result<Box<dyn AsyncWrite + Send + Unpin>>;

    async fn list(&self, dir: &str) -> Result<Vec<DropEntry>>;

    async fn stat(&self, path: &str) -> Result<Option<DropEntry>>;

    async fn remove(&self, path: &str) -> Result<()>;

    /// Rename `from` to `to`. Required to be atomic where the underlying
    /// store supports it; implementations that cannot guarantee atomicity
    /// (some SMB dialects) fall back to copy + remove.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Free space remaining on the drop, if the backend can report it.
    async fn free_space(&self) -> Result<Option<u64>>;
}

/// Build the Drop Store configured by `nfs_path`'s URL scheme: `fs://` for
/// [`local::LocalDropStore`], `smb://` for [`smb::SmbShareStore`] (only
/// when this crate is built with the `smb` feature).
#[cfg(feature = "smb")]
pub fn from_config(config: &crate::config::Config) -> Result<std::sync::Arc<dyn DropStore>> {
    if let Some(root) = config.nfs_path.strip_prefix("fs://") {
        return Ok(std::sync::Arc::new(local::LocalDropStore::new(root)));
    }

    let parts = config.parse_smb_url()?;
    let client = smb::SmbShareStore::connect(smb::SmbConnectParams {
        server: &parts.host,
        share: &parts.share,
        username: &parts.user,
        domain: &parts.domain,
        password: &parts.password,
        share_path: &config.smb_share_path,
    })?;
    Ok(std::sync::Arc::new(client))
}

#[cfg(not(feature = "smb"))]
pub fn from_config(config: &crate::config::Config) -> Result<std::sync::Arc<dyn DropStore>> {
    let root = config.nfs_path.strip_prefix("fs://").ok_or_else(|| {
        crate::error::RelayError::ConfigInvalid(
            "nfs_path uses smb:// but this binary was built without the `smb` feature".into(),
        )
    })?;
    Ok(std::sync::Arc::new(local::LocalDropStore::new(root)))
}
