//! Splitting a byte stream into indexed fragments.
//!
//! Two entry points: [`split_stream`] decides chunk boundaries online as
//! bytes arrive (upstream total size unknown — e.g. a chunk-encoded HTTP
//! response or a registry save), and [`split_file`] seeks a local file whose
//! size is known ahead of time and writes exact-size fragments.

use super::manifest::{chunk_file_name, Fragment, Manifest};
use crate::error::{RelayError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

const READ_BUF_SIZE: usize = 256 * 1024;

/// Stream `source` into fragments of at most `chunk_size` bytes under
/// `target_dir`, writing the manifest alongside them. Chunk boundaries are
/// decided as data arrives; the source need not know its own total size.
///
/// Simultaneously computes a whole-object SHA-256 by hashing every byte as
/// it is written (the source is not re-readable once consumed).
pub async fn split_stream<R: AsyncRead + Unpin>(
    mut source: R,
    target_dir: &Path,
    chunk_size: u64,
    original_name: &str,
) -> Result<Manifest> {
    tokio::fs::create_dir_all(target_dir).await?;

    let mut fragments = Vec::new();
    let mut total_size: u64 = 0;
    let mut whole_hash = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    let mut index = 0usize;
    let mut current_file: Option<File> = None;
    let mut current_size: u64 = 0;

    loop {
        let n = match source.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                if let Some(mut f) = current_file.take() {
                    let _ = f.flush().await;
                }
                cleanup_index(target_dir, index, original_name).await;
                return Err(RelayError::Io(e));
            }
        };

        if n == 0 {
            break;
        }

        whole_hash.update(&buf[..n]);
        total_size += n as u64;

        let mut offset = 0usize;
        while offset < n {
            if current_file.is_none() {
                let name = chunk_file_name(index, original_name);
                let file = File::create(target_dir.join(&name)).await?;
                current_file = Some(file);
                current_size = 0;
            }

            let remaining_in_chunk = (chunk_size - current_size) as usize;
            let take = remaining_in_chunk.min(n - offset);

            if let Some(file) = current_file.as_mut() {
                if let Err(e) = file.write_all(&buf[offset..offset + take]).await {
                    cleanup_index(target_dir, index, original_name).await;
                    return Err(RelayError::Io(e));
                }
            }

            current_size += take as u64;
            offset += take;

            if current_size >= chunk_size {
                close_fragment(
                    &mut current_file,
                    &mut fragments,
                    index,
                    original_name,
                    current_size,
                    total_size,
                )
                .await?;
                index += 1;
                current_size = 0;
            }
        }
    }

    // Flush a final partial fragment, or, for empty input, create the lone
    // zero-size terminal fragment the codec promises.
    if current_file.is_some() {
        close_fragment(
            &mut current_file,
            &mut fragments,
            index,
            original_name,
            current_size,
            total_size,
        )
        .await?;
    } else if fragments.is_empty() {
        let name = chunk_file_name(index, original_name);
        File::create(target_dir.join(&name)).await?;
        fragments.push(Fragment {
            index,
            file_name: name,
            size: 0,
            total_size: 0,
            terminal: false,
        });
    }

    if let Some(last) = fragments.last_mut() {
        last.terminal = true;
    }

    let mut manifest = Manifest::new(original_name.to_string(), fragments, total_size);
    manifest.sha256_hash = Some(hex::encode(whole_hash.finalize()));

    let manifest_path = super::manifest::manifest_path_for(target_dir, original_name);
    manifest.write(&manifest_path).await?;

    Ok(manifest)
}

async fn close_fragment(
    current_file: &mut Option<File>,
    fragments: &mut Vec<Fragment>,
    index: usize,
    original_name: &str,
    size: u64,
    total_size_so_far: u64,
) -> Result<()> {
    if let Some(mut file) = current_file.take() {
        file.flush().await?;
    }
    fragments.push(Fragment {
        index,
        file_name: chunk_file_name(index, original_name),
        size,
        total_size: total_size_so_far,
        terminal: false,
    });
    Ok(())
}

async fn cleanup_index(target_dir: &Path, index: usize, original_name: &str) {
    let path = target_dir.join(chunk_file_name(index, original_name));
    let _ = tokio::fs::remove_file(path).await;
}

/// Split a local file of known size into exact-size fragments via seek+copy.
pub async fn split_file(
    source_path: &Path,
    target_dir: &Path,
    chunk_size: u64,
    original_name: &str,
) -> Result<Manifest> {
    tokio::fs::create_dir_all(target_dir).await?;

    let total_size = tokio::fs::metadata(source_path).await?.len();
    let fragment_count = if total_size == 0 {
        1
    } else {
        ((total_size + chunk_size - 1) / chunk_size) as usize
    };

    let mut source = File::open(source_path).await?;
    let mut fragments = Vec::with_capacity(fragment_count);
    let mut buf = vec![0u8; READ_BUF_SIZE];

    for index in 0..fragment_count {
        let offset = index as u64 * chunk_size;
        let this_size = if total_size == 0 {
            0
        } else {
            chunk_size.min(total_size - offset)
        };

        source.seek(std::io::SeekFrom::Start(offset)).await?;
        let name = chunk_file_name(index, original_name);
        let mut out = File::create(target_dir.join(&name)).await?;

        let mut remaining = this_size;
        while remaining > 0 {
            let take = (buf.len() as u64).min(remaining) as usize;
            source.read_exact(&mut buf[..take]).await.map_err(|e| {
                RelayError::DropIoFailed(format!("short read splitting fragment {index}: {e}"))
            })?;
            out.write_all(&buf[..take]).await?;
            remaining -= take as u64;
        }
        out.flush().await?;

        fragments.push(Fragment {
            index,
            file_name: name,
            size: this_size,
            total_size,
            terminal: false,
        });
    }

    if let Some(last) = fragments.last_mut() {
        last.terminal = true;
    }

    let digests = crate::hash::hash_file(source_path).await?;
    let mut manifest = Manifest::new(original_name.to_string(), fragments, total_size);
    manifest.md5_hash = digests.md5;
    manifest.sha256_hash = digests.sha256;

    let manifest_path = super::manifest::manifest_path_for(target_dir, original_name);
    manifest.write(&manifest_path).await?;

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn split_stream_exact_multiple() {
        let dir = TempDir::new().unwrap();
        let data = vec![7u8; 20 * 1024 * 1024];
        let manifest = split_stream(&data[..], dir.path(), 5 * 1024 * 1024, "blob.bin")
            .await
            .unwrap();

        assert_eq!(manifest.fragment_count, 4);
        assert_eq!(manifest.total_size, 20 * 1024 * 1024);
        assert!(manifest.fragments[3].terminal);
        assert!(!manifest.fragments[0].terminal);
        let sum: u64 = manifest.fragments.iter().map(|f| f.size).sum();
        assert_eq!(sum, manifest.total_size);
    }

    #[tokio::test]
    async fn split_stream_off_by_one_tail() {
        let dir = TempDir::new().unwrap();
        let data = vec![1u8; 5 * 1024 * 1024 + 1];
        let manifest = split_stream(&data[..], dir.path(), 5 * 1024 * 1024, "blob.bin")
            .await
            .unwrap();

        assert_eq!(manifest.fragment_count, 2);
        assert_eq!(manifest.fragments[0].size, 5 * 1024 * 1024);
        assert_eq!(manifest.fragments[1].size, 1);
        assert!(manifest.fragments[1].terminal);
    }

    #[tokio::test]
    async fn split_stream_empty_input() {
        let dir = TempDir::new().unwrap();
        let manifest = split_stream(&b""[..], dir.path(), 1024, "blob.bin")
            .await
            .unwrap();

        assert_eq!(manifest.fragment_count, 1);
        assert_eq!(manifest.fragments[0].size, 0);
        assert!(manifest.fragments[0].terminal);
    }

    #[tokio::test]
    async fn split_file_exact_size_known_upfront() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.bin");
        tokio::fs::write(&src, vec![3u8; 12]).await.unwrap();

        let out_dir = dir.path().join("frags");
        let manifest = split_file(&src, &out_dir, 5, "src.bin").await.unwrap();

        assert_eq!(manifest.fragment_count, 3);
        assert_eq!(manifest.fragments[2].size, 2);
        assert!(manifest.md5_hash.is_some());
        assert!(manifest.sha256_hash.is_some());
    }
}
