//! Local-filesystem-backed Drop Store.

use super::{DropEntry, DropStore};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};

pub struct LocalDropStore {
    root: PathBuf,
}

impl LocalDropStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalDropStore { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl DropStore for LocalDropStore {
    async fn open_read(&self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let file = tokio::fs::File::open(self.resolve(path)).await?;
        Ok(Box::new(file))
    }

    async fn create_write(&self, path: &str) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(full).await?;
        Ok(Box::new(file))
    }

    async fn list(&self, dir: &str) -> Result<Vec<DropEntry>> {
        let full = self.resolve(dir);
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(RelayError::Io(e)),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(DropEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<Option<DropEntry>> {
        let full = self.resolve(path);
        match tokio::fs::metadata(&full).await {
            Ok(metadata) => Ok(Some(DropEntry {
                name: Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RelayError::Io(e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RelayError::Io(e)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        // tokio::fs::rename is atomic within one filesystem, which the
        // local backend always is, so no temp-name fallback is needed here.
        tokio::fs::rename(self.resolve(from), self.resolve(to)).await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<Option<u64>> {
        match fs4::tokio::available_space(&self.root).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_read_rename_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalDropStore::new(dir.path());

        {
            let mut w = store.create_write("job.tmp").await.unwrap();
            w.write_all(b"hello").await.unwrap();
            w.flush().await.unwrap();
        }

        store.rename("job.tmp", "job.bin").await.unwrap();
        assert!(store.stat("job.tmp").await.unwrap().is_none());

        let mut r = store.open_read("job.bin").await.unwrap();
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");
    }

    #[tokio::test]
    async fn list_reflects_directory_contents() {
        let dir = TempDir::new().unwrap();
        let store = LocalDropStore::new(dir.path());

        {
            let mut w = store.create_write("a.job").await.unwrap();
            w.write_all(b"x").await.unwrap();
        }
        {
            let mut w = store.create_write("b.job").await.unwrap();
            w.write_all(b"yy").await.unwrap();
        }

        let mut names: Vec<String> = store
            .list(".")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.job".to_string(), "b.job".to_string()]);
    }

    #[tokio::test]
    async fn remove_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalDropStore::new(dir.path());
        store.remove("nope.job").await.unwrap();
    }
}
