//! Fragment and manifest types, plus the on-disk naming scheme.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CHUNK_PREFIX: &str = "chunk_";
pub const MANIFEST_SUFFIX: &str = ".manifest";

/// A contiguous byte range of the logical artifact, stored as its own file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fragment {
    pub index: usize,
    pub file_name: String,
    pub size: u64,
    pub total_size: u64,
    pub terminal: bool,
}

/// Sidecar metadata for one fragmented artifact (`<original>.manifest`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub original_file_name: String,
    pub total_size: u64,
    pub fragment_count: usize,
    pub fragments: Vec<Fragment>,
    pub completed: bool,
    pub md5_hash: Option<String>,
    pub sha256_hash: Option<String>,
}

impl Manifest {
    pub fn new(original_file_name: String, fragments: Vec<Fragment>, total_size: u64) -> Self {
        Manifest {
            original_file_name,
            total_size,
            fragment_count: fragments.len(),
            fragments,
            completed: false,
            md5_hash: None,
            sha256_hash: None,
        }
    }

    pub fn digests(&self) -> crate::hash::DigestPair {
        crate::hash::DigestPair {
            md5: self.md5_hash.clone(),
            sha256: self.sha256_hash.clone(),
        }
    }

    pub async fn write(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, json).await
    }

    pub async fn read(path: &Path) -> crate::error::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let manifest: Manifest = serde_json::from_slice(&bytes)?;
        Ok(manifest)
    }
}

/// Name of the fragment file at `index` for `original`, e.g. `chunk_3_blob.bin`.
pub fn chunk_file_name(index: usize, original: &str) -> String {
    format!("{CHUNK_PREFIX}{index}_{original}")
}

/// Name of the manifest file for `original`, e.g. `blob.bin.manifest`.
pub fn manifest_file_name(original: &str) -> String {
    format!("{original}{MANIFEST_SUFFIX}")
}

pub fn is_manifest_file(name: &str) -> bool {
    name.ends_with(MANIFEST_SUFFIX)
}

pub fn is_chunk_file(name: &str) -> bool {
    name.starts_with(CHUNK_PREFIX)
}

/// Recover the original artifact name a manifest file describes.
pub fn original_name_from_manifest(manifest_name: &str) -> Option<&str> {
    manifest_name.strip_suffix(MANIFEST_SUFFIX)
}

/// Recover `(index, original)` from a chunk file name, if well-formed.
pub fn parse_chunk_file_name(chunk_name: &str) -> Option<(usize, &str)> {
    let rest = chunk_name.strip_prefix(CHUNK_PREFIX)?;
    let (index_str, original) = rest.split_once('_')?;
    let index: usize = index_str.parse().ok()?;
    Some((index, original))
}

pub fn manifest_path_for(dir: &Path, original: &str) -> PathBuf {
    dir.join(manifest_file_name(original))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_and_manifest_names_round_trip() {
        let name = chunk_file_name(3, "blob.bin");
        assert_eq!(name, "chunk_3_blob.bin");
        assert_eq!(parse_chunk_file_name(&name), Some((3, "blob.bin")));

        let manifest = manifest_file_name("blob.bin");
        assert_eq!(manifest, "blob.bin.manifest");
        assert!(is_manifest_file(&manifest));
        assert_eq!(original_name_from_manifest(&manifest), Some("blob.bin"));
    }

    #[test]
    fn is_chunk_file_detects_prefix() {
        assert!(is_chunk_file("chunk_0_blob.bin"));
        assert!(!is_chunk_file("blob.bin.manifest"));
    }
}
