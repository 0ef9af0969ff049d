//! SMB/CIFS-backed Drop Store, for drops reached via `smb://user@domain:pass@host/share`.
//!
//! Dials the share with NTLM credentials, mounts it, and treats directory
//! listing / file open / rename as the only operations the rest of the
//! system needs.

use super::{DropEntry, DropStore};
use crate::error::{RelayError, Result};
use async_trait::async_trait;
use pavao::{SmbClient, SmbCredentials, SmbOptions};
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};

pub struct SmbShareStore {
    client: Arc<Mutex<SmbClient>>,
    share_path: String,
}

pub struct SmbConnectParams<'a> {
    pub server: &'a str,
    pub share: &'a str,
    pub username: &'a str,
    pub domain: &'a str,
    pub password: &'a str,
    /// Sub-path inside the mount where the drop lives (`smb_share_path` config key).
    pub share_path: &'a str,
}

impl SmbShareStore {
    pub fn connect(params: SmbConnectParams<'_>) -> Result<Self> {
        let credentials = SmbCredentials::default()
            .server(format!("smb://{}", params.server))
            .share(params.share)
            .username(params.username)
            .password(params.password)
            .workgroup(params.domain);

        let client = SmbClient::new(credentials, SmbOptions::default())
            .map_err(|e| RelayError::DropIoFailed(format!("smb connect failed: {e}")))?;

        Ok(SmbShareStore {
            client: Arc::new(Mutex::new(client)),
            share_path: params.share_path.trim_matches('/').to_string(),
        })
    }

    fn resolve(&self, path: &str) -> String {
        if self.share_path.is_empty() {
            format!("/{}", path.trim_start_matches('/'))
        } else {
            format!("/{}/{}", self.share_path, path.trim_start_matches('/'))
        }
    }
}

fn lock_err() -> RelayError {
    RelayError::DropIoFailed("smb client lock poisoned".into())
}

/// Run a blocking pavao call on the blocking thread pool. libsmbclient
/// handles aren't async; every trait method below hands the client `Arc`
/// to `spawn_blocking` and ferries back plain bytes/`Vec<DropEntry>`
/// rather than holding the lock across an await point.
async fn run_blocking<F, T>(client: Arc<Mutex<SmbClient>>, f: F) -> Result<T>
where
    F: FnOnce(&SmbClient) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let guard = client.lock().map_err(|_| lock_err())?;
        f(&guard)
    })
    .await
    .map_err(|e| RelayError::DropIoFailed(format!("smb blocking task panicked: {e}")))?
}

async fn write_whole_file(client: Arc<Mutex<SmbClient>>, path: String, bytes: Vec<u8>) -> Result<()> {
    run_blocking(client, move |c| {
        c.open_write(&path, true)
            .and_then(|mut f| f.write_all(&bytes))
            .map_err(|e| RelayError::DropIoFailed(format!("smb write {path}: {e}")))
    })
    .await
}

/// `AsyncWrite` adapter over a backend with no native streaming write API:
/// bytes accumulate in memory and the whole file is written to the share in
/// one blocking call on `shutdown` (the point at which callers are required
/// to have flushed everything, per the `AsyncWrite` contract).
struct SmbWriter {
    client: Arc<Mutex<SmbClient>>,
    path: String,
    buf: Vec<u8>,
    flushing: Option<Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>>>,
}

impl SmbWriter {
    fn new(client: Arc<Mutex<SmbClient>>, path: String) -> Self {
        SmbWriter {
            client,
            path,
            buf: Vec::new(),
            flushing: None,
        }
    }
}

impl AsyncWrite for SmbWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        this.buf.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        loop {
            if let Some(fut) = this.flushing.as_mut() {
                return fut.as_mut().poll(cx);
            }
            let bytes = std::mem::take(&mut this.buf);
            let client = this.client.clone();
            let path = this.path.clone();
            this.flushing = Some(Box::pin(async move {
                write_whole_file(client, path, bytes)
                    .await
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
            }));
        }
    }
}

#[async_trait]
impl DropStore for SmbShareStore {
    async fn open_read(&self, path: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let full = self.resolve(path);
        let client = self.client.clone();
        let bytes = run_blocking(client, move |c| {
            c.open_read(&full)
                .and_then(|mut f| f.read_all())
                .map_err(|e| RelayError::DropIoFailed(format!("smb read {full}: {e}")))
        })
        .await?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn create_write(&self, path: &str) -> Result<Box<dyn AsyncWrite + Send + Unpin>> {
        let full = self.resolve(path);
        Ok(Box::new(SmbWriter::new(self.client.clone(), full)))
    }

    async fn list(&self, dir: &str) -> Result<Vec<DropEntry>> {
        let full = self.resolve(dir);
        let client = self.client.clone();
        let client_entries = run_blocking(client, move |c| {
            c.list_dir(&full)
                .map_err(|e| RelayError::DropIoFailed(format!("smb list {full}: {e}")))
        })
        .await?;

        Ok(client_entries
            .into_iter()
            .filter(|e| e.name() != "." && e.name() != "..")
            .map(|e| DropEntry {
                name: e.name().to_string(),
                size: e.get_size().unwrap_or(0),
                is_dir: e.is_dir(),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<Option<DropEntry>> {
        let full = self.resolve(path);
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let client = self.client.clone();
        let stat = run_blocking(client, move |c| Ok(c.stat(&full).ok())).await?;
        Ok(stat.map(|s| DropEntry {
            name,
            size: s.size,
            is_dir: s.is_dir(),
        }))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        let client = self.client.clone();
        run_blocking(client, move |c| match c.unlink(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("No such file") => Ok(()),
            Err(e) => Err(RelayError::DropIoFailed(format!("smb remove {full}: {e}"))),
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let full_from = self.resolve(from);
        let full_to = self.resolve(to);
        let client = self.client.clone();
        run_blocking(client, move |c| {
            if c.rename(&full_from, &full_to).is_ok() {
                return Ok(());
            }

            // Some SMB dialects don't support atomic rename: fall back to
            // copy + remove.
            let bytes = c
                .open_read(&full_from)
                .and_then(|mut f| f.read_all())
                .map_err(|e| RelayError::DropIoFailed(format!("smb fallback-copy read: {e}")))?;
            c.open_write(&full_to, true)
                .and_then(|mut f| f.write_all(&bytes))
                .map_err(|e| RelayError::DropIoFailed(format!("smb fallback-copy write: {e}")))?;
            c.unlink(&full_from)
                .map_err(|e| RelayError::DropIoFailed(format!("smb fallback-copy remove: {e}")))?;

            Ok(())
        })
        .await
    }

    async fn free_space(&self) -> Result<Option<u64>> {
        // libsmbclient exposes statvfs-like info inconsistently across
        // server dialects; treated as unavailable rather than guessed.
        Ok(None)
    }
}

impl SmbShareStore {
    /// Buffered write for callers that already have the whole payload in
    /// memory and want to skip the `AsyncWrite` adapter (`SmbWriter`).
    pub async fn write_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let full = self.resolve(path);
        write_whole_file(self.client.clone(), full, bytes).await
    }
}
