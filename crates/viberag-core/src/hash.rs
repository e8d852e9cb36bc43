//! Content hasher (spec §4.3).
//!
//! SHA-256 over raw bytes, for both files and in-memory strings, plus
//! binary-file detection by sniffing a small prefix of the file.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Number of leading bytes sniffed to decide whether a file is binary.
const SNIFF_BYTES: usize = 8192;

/// Fraction of non-text bytes in the sniffed prefix above which a file is
/// classified binary, even without a NUL byte.
const NON_TEXT_RATIO_THRESHOLD: f64 = 0.30;

/// Hash the full contents of `path`. I/O errors propagate as "file
/// skipped" to the caller (the Merkle builder turns this into a skip
/// rather than a hard failure).
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| CoreError::HashError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut reader = BufReader::with_capacity(SNIFF_BYTES, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; SNIFF_BYTES];

    loop {
        let n = reader.read(&mut buffer).map_err(|e| CoreError::HashError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(encode_hex(&hasher.finalize()))
}

/// Hash an in-memory string. Used for chunk content hashes and embedding
/// cache keys.
pub fn hash_string(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    encode_hex(&hasher.finalize())
}

/// Sniff the first bytes of `path` and classify it as binary or text.
///
/// A file is binary if its prefix contains a NUL byte, or if more than
/// [`NON_TEXT_RATIO_THRESHOLD`] of the sniffed bytes fall outside the
/// printable-ASCII/UTF-8-continuation range.
pub fn is_binary(path: &Path) -> Result<bool> {
    let mut file = File::open(path).map_err(|e| CoreError::HashError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut buffer = vec![0u8; SNIFF_BYTES];
    let n = file.read(&mut buffer).map_err(|e| CoreError::HashError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    buffer.truncate(n);

    Ok(looks_binary(&buffer))
}

fn looks_binary(buffer: &[u8]) -> bool {
    if buffer.is_empty() {
        return false;
    }
    if buffer.contains(&0) {
        return true;
    }

    let non_text = buffer
        .iter()
        .filter(|&&b| !(b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7e).contains(&b) || b >= 0x80))
        .count();

    (non_text as f64 / buffer.len() as f64) > NON_TEXT_RATIO_THRESHOLD
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hash_string_is_deterministic() {
        assert_eq!(hash_string("hello"), hash_string("hello"));
        assert_ne!(hash_string("hello"), hash_string("world"));
    }

    #[test]
    fn hash_file_matches_known_vector() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "hello world").unwrap();

        let hash = hash_file(&path).unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn text_file_is_not_binary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("src.rs");
        std::fs::write(&path, "fn main() {}\n").unwrap();
        assert!(!is_binary(&path).unwrap());
    }

    #[test]
    fn nul_byte_makes_file_binary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [0u8, 1, 2, 3, 0, 5]).unwrap();
        assert!(is_binary(&path).unwrap());
    }

    #[test]
    fn empty_file_is_not_binary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, []).unwrap();
        assert!(!is_binary(&path).unwrap());
    }

    #[test]
    fn missing_file_errors() {
        assert!(hash_file(Path::new("/nonexistent/file.txt")).is_err());
    }
}
