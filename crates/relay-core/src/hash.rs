//! Streaming MD5 + SHA-256 digests over files or readers.
//!
//! Both digests are optional: the sender may not have been able to compute
//! one (read-once upstream stream), and a comparison against a missing
//! expected value is "unverifiable, skip" rather than an error.

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestPair {
    pub md5: Option<String>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    Match,
    Mismatch,
    Unverifiable,
}

impl DigestPair {
    /// Compare `self` (expected, e.g. from a manifest) against `actual`.
    /// Missing digests on either side never produce a hard failure.
    pub fn compare(&self, actual: &DigestPair) -> DigestOutcome {
        let mut checked = false;

        if let (Some(expected), Some(got)) = (&self.sha256, &actual.sha256) {
            checked = true;
            if !expected.eq_ignore_ascii_case(got) {
                return DigestOutcome::Mismatch;
            }
        }

        if let (Some(expected), Some(got)) = (&self.md5, &actual.md5) {
            checked = true;
            if !expected.eq_ignore_ascii_case(got) {
                return DigestOutcome::Mismatch;
            }
        }

        if checked {
            DigestOutcome::Match
        } else {
            DigestOutcome::Unverifiable
        }
    }
}

/// Stream-hash an async reader, computing both digests in one pass.
pub async fn hash_reader<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<DigestPair> {
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }

    Ok(DigestPair {
        md5: Some(hex::encode(md5.finalize())),
        sha256: Some(hex::encode(sha256.finalize())),
    })
}

/// Stream-hash a file at `path`, computing both digests in one pass.
pub async fn hash_file(path: &std::path::Path) -> std::io::Result<DigestPair> {
    let file = tokio::fs::File::open(path).await?;
    hash_reader(file).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_reader_matches_known_vectors() {
        let digests = hash_reader(&b"abc"[..]).await.unwrap();
        assert_eq!(
            digests.md5.as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            digests.sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn compare_is_unverifiable_when_absent() {
        let expected = DigestPair::default();
        let actual = DigestPair {
            md5: Some("x".into()),
            sha256: Some("y".into()),
        };
        assert_eq!(expected.compare(&actual), DigestOutcome::Unverifiable);
    }

    #[test]
    fn compare_detects_mismatch() {
        let expected = DigestPair {
            md5: None,
            sha256: Some("a".into()),
        };
        let actual = DigestPair {
            md5: None,
            sha256: Some("b".into()),
        };
        assert_eq!(expected.compare(&actual), DigestOutcome::Mismatch);
    }

    #[test]
    fn compare_matches_case_insensitively() {
        let expected = DigestPair {
            md5: Some("ABCD".into()),
            sha256: None,
        };
        let actual = DigestPair {
            md5: Some("abcd".into()),
            sha256: None,
        };
        assert_eq!(expected.compare(&actual), DigestOutcome::Match);
    }
}
