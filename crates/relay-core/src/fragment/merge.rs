//! Reassembling fragments back into the original artifact.

use super::manifest::Manifest;
use crate::error::{RelayError, Result};
use crate::hash::{hash_file, DigestOutcome};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Reconstruct the original file from the fragments named in `manifest_path`
/// (resolved relative to its own directory), verify any digests the
/// manifest carries, and rewrite the manifest with `completed = true` on
/// success. Returns the path of the merged file.
///
/// Missing fragments, short fragments, and digest mismatches are fatal for
/// the job but never roll back bytes already written — the partial output
/// is left in place for callers to inspect or delete.
pub async fn merge(manifest_path: &Path, target_dir: &Path) -> Result<PathBuf> {
    let manifest = Manifest::read(manifest_path).await?;
    let fragments_dir = manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    for fragment in &manifest.fragments {
        let path = fragments_dir.join(&fragment.file_name);
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if !exists {
            return Err(RelayError::ManifestInvalid(format!(
                "missing fragment {}",
                fragment.file_name
            )));
        }
    }

    let output_path = target_dir.join(&manifest.original_file_name);
    tokio::fs::create_dir_all(target_dir).await?;
    let mut output = tokio::fs::File::create(&output_path).await?;

    for fragment in &manifest.fragments {
        let path = fragments_dir.join(&fragment.file_name);
        let bytes = tokio::fs::read(&path).await?;
        if bytes.len() as u64 != fragment.size {
            return Err(RelayError::ManifestInvalid(format!(
                "fragment {} is {} bytes, manifest declares {}",
                fragment.file_name,
                bytes.len(),
                fragment.size
            )));
        }
        output.write_all(&bytes).await?;
    }
    output.flush().await?;
    drop(output);

    let expected = manifest.digests();
    if expected.md5.is_some() || expected.sha256.is_some() {
        let actual = hash_file(&output_path).await?;
        match expected.compare(&actual) {
            DigestOutcome::Mismatch => {
                return Err(RelayError::HashMismatch {
                    expected: expected.sha256.or(expected.md5).unwrap_or_default(),
                    actual: actual.sha256.or(actual.md5).unwrap_or_default(),
                });
            }
            DigestOutcome::Match | DigestOutcome::Unverifiable => {}
        }
    }

    let mut completed_manifest = manifest;
    completed_manifest.completed = true;
    completed_manifest.write(manifest_path).await?;

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::split::split_stream;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trip_bit_for_bit() {
        let dir = TempDir::new().unwrap();
        let frags_dir = dir.path().join("frags");
        let data: Vec<u8> = (0..=255u8).cycle().take(1_234_567).collect();

        let manifest = split_stream(&data[..], &frags_dir, 100_000, "payload.bin")
            .await
            .unwrap();
        let manifest_path =
            crate::fragment::manifest::manifest_path_for(&frags_dir, "payload.bin");

        let out_dir = dir.path().join("merged");
        let merged_path = merge(&manifest_path, &out_dir).await.unwrap();
        let merged_bytes = tokio::fs::read(&merged_path).await.unwrap();

        assert_eq!(merged_bytes, data);
        assert_eq!(manifest.total_size, data.len() as u64);

        let reloaded = Manifest::read(&manifest_path).await.unwrap();
        assert!(reloaded.completed);
    }

    #[tokio::test]
    async fn corrupted_fragment_fails_hash_check() {
        let dir = TempDir::new().unwrap();
        let frags_dir = dir.path().join("frags");
        let data = vec![9u8; 300_000];

        split_stream(&data[..], &frags_dir, 100_000, "payload.bin")
            .await
            .unwrap();
        let manifest_path =
            crate::fragment::manifest::manifest_path_for(&frags_dir, "payload.bin");

        // Flip one byte in fragment index 2.
        let frag2 = frags_dir.join("chunk_2_payload.bin");
        let mut bytes = tokio::fs::read(&frag2).await.unwrap();
        bytes[0] ^= 0xFF;
        tokio::fs::write(&frag2, bytes).await.unwrap();

        let out_dir = dir.path().join("merged");
        let result = merge(&manifest_path, &out_dir).await;
        assert!(matches!(result, Err(RelayError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn missing_fragment_is_fatal() {
        let dir = TempDir::new().unwrap();
        let frags_dir = dir.path().join("frags");
        let data = vec![1u8; 300_000];

        split_stream(&data[..], &frags_dir, 100_000, "payload.bin")
            .await
            .unwrap();
        let manifest_path =
            crate::fragment::manifest::manifest_path_for(&frags_dir, "payload.bin");

        tokio::fs::remove_file(frags_dir.join("chunk_1_payload.bin"))
            .await
            .unwrap();

        let out_dir = dir.path().join("merged");
        let result = merge(&manifest_path, &out_dir).await;
        assert!(matches!(result, Err(RelayError::ManifestInvalid(_))));
    }
}
