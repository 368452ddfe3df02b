// Shelver - core/hasher.rs
//
// Content fingerprints (SHA-256, lowercase hex) bounded by a size ceiling.
//
// Empty files and files above the ceiling get no fingerprint: large files are
// relocated without verification rather than paying a full extra read.

use crate::util::constants;
use crate::util::error::HashError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Computes content fingerprints for files up to `size_limit` bytes.
#[derive(Debug, Clone, Copy)]
pub struct ContentHasher {
    size_limit: u64,
}

impl ContentHasher {
    pub fn new(size_limit: u64) -> Self {
        Self { size_limit }
    }

    pub fn size_limit(&self) -> u64 {
        self.size_limit
    }

    /// Fingerprint `path`, or `Ok(None)` when the file is empty or larger
    /// than the ceiling.
    pub fn try_fingerprint(&self, path: &Path) -> Result<Option<String>, HashError> {
        let io_err = |source: io::Error| HashError::Io {
            path: path.to_path_buf(),
            source,
        };

        let size = std::fs::metadata(path).map_err(io_err)?.len();
        if size == 0 {
            return Ok(None);
        }
        if size > self.size_limit {
            tracing::debug!(
                file = %path.display(),
                size,
                limit = self.size_limit,
                "File above hashing ceiling; fingerprint skipped"
            );
            return Ok(None);
        }

        let file = File::open(path).map_err(io_err)?;
        let mut reader = BufReader::with_capacity(constants::HASH_CHUNK_SIZE, file);
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher).map_err(io_err)?;
        Ok(Some(format!("{:x}", hasher.finalize())))
    }

    /// Best-effort fingerprint: read errors are logged and yield `None`.
    pub fn fingerprint(&self, path: &Path) -> Option<String> {
        match self.try_fingerprint(path) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!(error = %e, "Fingerprint unavailable");
                None
            }
        }
    }
}

/// Streaming byte-for-byte comparison. Used where no fingerprint exists
/// (files above the ceiling); memory use is bounded by two chunk buffers.
pub fn identical_bytes(a: &Path, b: &Path) -> Result<bool, HashError> {
    let open = |path: &Path| {
        File::open(path)
            .map(|f| BufReader::with_capacity(constants::HASH_CHUNK_SIZE, f))
            .map_err(|source| HashError::Io {
                path: path.to_path_buf(),
                source,
            })
    };
    let (mut reader_a, mut reader_b) = (open(a)?, open(b)?);

    loop {
        let chunk_a = reader_a.fill_buf().map_err(|source| HashError::Io {
            path: a.to_path_buf(),
            source,
        })?;
        let chunk_b = reader_b.fill_buf().map_err(|source| HashError::Io {
            path: b.to_path_buf(),
            source,
        })?;
        if chunk_a.is_empty() || chunk_b.is_empty() {
            return Ok(chunk_a.is_empty() && chunk_b.is_empty());
        }
        let n = chunk_a.len().min(chunk_b.len());
        if chunk_a[..n] != chunk_b[..n] {
            return Ok(false);
        }
        reader_a.consume(n);
        reader_b.consume(n);
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(constants::DEFAULT_HASH_SIZE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        fs::write(&path, "hello").unwrap();
        let hash = ContentHasher::default().fingerprint(&path);
        assert_eq!(hash.as_deref(), Some(HELLO_SHA256));
    }

    #[test]
    fn test_empty_file_has_no_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "").unwrap();
        assert_eq!(ContentHasher::default().try_fingerprint(&path).unwrap(), None);
    }

    #[test]
    fn test_file_above_ceiling_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, "hello").unwrap();
        let hasher = ContentHasher::new(4);
        assert_eq!(hasher.try_fingerprint(&path).unwrap(), None);
        // Exactly at the ceiling is still hashed.
        let hasher = ContentHasher::new(5);
        assert_eq!(hasher.fingerprint(&path).as_deref(), Some(HELLO_SHA256));
    }

    #[test]
    fn test_missing_file_is_error_but_fingerprint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let hasher = ContentHasher::default();
        assert!(matches!(
            hasher.try_fingerprint(&path),
            Err(HashError::Io { .. })
        ));
        assert_eq!(hasher.fingerprint(&path), None);
    }

    #[test]
    fn test_identical_bytes_compares_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        let d = dir.path().join("d");
        let big = vec![7u8; constants::HASH_CHUNK_SIZE * 2 + 3];
        let mut other = big.clone();
        *other.last_mut().unwrap() = 8;
        fs::write(&a, &big).unwrap();
        fs::write(&b, &big).unwrap();
        fs::write(&c, &other).unwrap();
        fs::write(&d, &big[..big.len() - 1]).unwrap();

        assert!(identical_bytes(&a, &b).unwrap());
        assert!(!identical_bytes(&a, &c).unwrap());
        assert!(!identical_bytes(&a, &d).unwrap());
        assert!(identical_bytes(&a, &dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_different_content_different_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "alpha").unwrap();
        fs::write(&b, "beta").unwrap();
        let hasher = ContentHasher::default();
        assert_ne!(hasher.fingerprint(&a), hasher.fingerprint(&b));
    }
}
