//! Content fingerprints.
//!
//! Files are hashed with SHA-256 in fixed-size blocks so memory use does not
//! depend on file size. The digest depends only on the bytes, never on the
//! filename, which is what makes cross-name duplicate detection work.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::FileAccessError;
use crate::models::ContentHash;

const READ_BLOCK: usize = 64 * 1024;

/// Length of a hex-encoded digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash everything `reader` yields.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BLOCK];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file on disk.
///
/// Callers treat an error as "cannot classify": the file is skipped and
/// logged, never indexed.
pub fn hash_file(path: &Path) -> Result<ContentHash, FileAccessError> {
    let file = File::open(path).map_err(|e| FileAccessError::new(path, e))?;
    hash_reader(file).map_err(|e| FileAccessError::new(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn same_bytes_same_digest_regardless_of_name() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("renamed copy.txt");
        fs::write(&a, "quarterly report").unwrap();
        fs::write(&b, "quarterly report").unwrap();
        assert_eq!(hash_file(&a).unwrap(), hash_file(&b).unwrap());
    }

    #[test]
    fn digest_is_stable_across_calls() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, "stable").unwrap();
        let first = hash_file(&a).unwrap();
        for _ in 0..3 {
            assert_eq!(hash_file(&a).unwrap(), first);
        }
    }

    #[test]
    fn digest_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, "version one").unwrap();
        let before = hash_file(&a).unwrap();
        fs::write(&a, "version two").unwrap();
        assert_ne!(hash_file(&a).unwrap(), before);
    }

    #[test]
    fn digest_has_fixed_length() {
        assert_eq!(hash_bytes(b"").len(), DIGEST_HEX_LEN);
        assert_eq!(hash_bytes(&vec![7u8; 300_000]).len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn streaming_matches_one_shot_for_multi_block_input() {
        let data: Vec<u8> = (0..(READ_BLOCK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        assert_eq!(hash_reader(&data[..]).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn missing_file_is_file_access_error() {
        let dir = TempDir::new().unwrap();
        let err = hash_file(&dir.path().join("gone.txt")).unwrap_err();
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }
}
