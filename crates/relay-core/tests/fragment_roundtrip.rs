//! Integration coverage for the fragment codec's testable properties (§8):
//! manifest invariants after split, bit-for-bit round trips, and the
//! concrete S2/S3 chunking scenarios.

use relay_core::fragment::manifest::manifest_path_for;
use relay_core::fragment::{merge_fragments, split_file, split_stream, Manifest};
use tempfile::TempDir;

fn manifest_invariants_hold(manifest: &Manifest, original_len: usize) {
    let sum: u64 = manifest.fragments.iter().map(|f| f.size).sum();
    assert_eq!(sum, original_len as u64, "sum(sizes) == |X|");
    assert_eq!(manifest.fragments.len(), manifest.fragment_count);

    for (i, fragment) in manifest.fragments.iter().enumerate() {
        assert_eq!(fragment.index, i, "indices are 0..N-1 in order");
    }

    let terminal_count = manifest.fragments.iter().filter(|f| f.terminal).count();
    assert_eq!(terminal_count, 1, "exactly one terminal fragment");
    assert!(
        manifest.fragments.last().unwrap().terminal,
        "last index is the terminal one"
    );
}

#[tokio::test]
async fn s2_exact_multiple_chunking() {
    let dir = TempDir::new().unwrap();
    let data = vec![0xABu8; 20 * 1024 * 1024];
    let chunk_size = 5 * 1024 * 1024;

    let manifest = split_stream(&data[..], dir.path(), chunk_size, "image.tar")
        .await
        .unwrap();

    assert_eq!(manifest.fragment_count, 4);
    manifest_invariants_hold(&manifest, data.len());
    for fragment in &manifest.fragments[..3] {
        assert_eq!(fragment.size, chunk_size as u64);
    }
    assert_eq!(manifest.fragments[3].size, chunk_size as u64);
    assert!(manifest.fragments[3].terminal);
    assert_eq!(manifest.total_size, data.len() as u64);

    let manifest_path = manifest_path_for(dir.path(), "image.tar");
    let out_dir = dir.path().join("out");
    let merged = merge_fragments(&manifest_path, &out_dir).await.unwrap();
    let merged_bytes = tokio::fs::read(&merged).await.unwrap();
    assert_eq!(merged_bytes, data, "merge(split(X, k)) == X bit-for-bit");
}

#[tokio::test]
async fn s3_off_by_one_tail() {
    let dir = TempDir::new().unwrap();
    let chunk_size = 5 * 1024 * 1024;
    let data = vec![0x5Au8; chunk_size + 1];

    let manifest = split_stream(&data[..], dir.path(), chunk_size as u64, "package.whl")
        .await
        .unwrap();

    assert_eq!(manifest.fragment_count, 2);
    manifest_invariants_hold(&manifest, data.len());
    assert_eq!(manifest.fragments[0].size, chunk_size as u64);
    assert_eq!(manifest.fragments[1].size, 1);
    assert!(manifest.fragments[1].terminal);
    assert!(!manifest.fragments[0].terminal);
}

#[tokio::test]
async fn split_file_matches_split_stream_digests() {
    let dir = TempDir::new().unwrap();
    let data: Vec<u8> = (0..10_000u32).map(|n| (n % 251) as u8).collect();
    let source_path = dir.path().join("source.bin");
    tokio::fs::write(&source_path, &data).await.unwrap();

    let from_stream = split_stream(&data[..], &dir.path().join("via_stream"), 4096, "source.bin")
        .await
        .unwrap();
    let from_file = split_file(&source_path, &dir.path().join("via_file"), 4096, "source.bin")
        .await
        .unwrap();

    assert_eq!(from_stream.total_size, from_file.total_size);
    assert_eq!(from_stream.sha256_hash, from_file.sha256_hash);
    assert_eq!(from_file.md5_hash.is_some(), true);
}

#[tokio::test]
async fn s4_corrupted_fragment_surfaces_hash_mismatch_and_preserves_output() {
    let dir = TempDir::new().unwrap();
    let data = vec![7u8; 256 * 1024];

    split_stream(&data[..], dir.path(), 100 * 1024, "model.bin")
        .await
        .unwrap();
    let manifest_path = manifest_path_for(dir.path(), "model.bin");

    let frag2 = dir.path().join("chunk_2_model.bin");
    let mut bytes = tokio::fs::read(&frag2).await.unwrap();
    bytes[0] ^= 0xFF;
    tokio::fs::write(&frag2, bytes).await.unwrap();

    let out_dir = dir.path().join("out");
    let err = merge_fragments(&manifest_path, &out_dir).await.unwrap_err();
    assert!(matches!(err, relay_core::RelayError::HashMismatch { .. }));

    // The partially-written output is left in place for inspection, not
    // rolled back, per §7's "Receiver never deletes artifacts whose merge
    // or verify failed" rule.
    assert!(tokio::fs::try_exists(out_dir.join("model.bin"))
        .await
        .unwrap());
}
