// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Content hashing
//!
//! Uses BLAKE3 for fast, secure content hashing.

use blake3::Hasher;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::Fingerprint;
use crate::errors::ReproError;

/// Incremental content hasher
pub struct ContentHasher {
    hasher: Hasher,
}

impl ContentHasher {
    /// Create a new content hasher
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Stream a single file's contents into the hasher
    pub fn hash_file(&mut self, path: &Path) -> Result<(), ReproError> {
        let mut file = File::open(path).map_err(|e| ReproError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf).map_err(|e| ReproError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            self.hasher.update(&buf[..n]);
        }

        Ok(())
    }

    /// Hash every file below `root`, keyed by its path relative to `root`.
    ///
    /// Entries are visited in sorted order so the result does not depend on
    /// directory iteration order.
    pub fn hash_dir(&mut self, root: &Path) -> Result<(), ReproError> {
        let mut files = Vec::new();
        collect_files(root, &mut files)?;
        files.sort();

        for file in files {
            let rel = file.strip_prefix(root).unwrap_or(&file);
            self.hasher.update(rel.to_string_lossy().as_bytes());
            self.hasher.update(&[0]);
            self.hasher.update(hash_file(&file)?.as_str().as_bytes());
        }

        Ok(())
    }

    /// Hash arbitrary bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finalize and get the fingerprint
    pub fn finalize(self) -> Fingerprint {
        Fingerprint::new(self.hasher.finalize().to_hex().to_string())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReproError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ReproError::FileReadError {
        path: dir.to_path_buf(),
        error: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ReproError::FileReadError {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;

        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }

    Ok(())
}

/// Compute a quick hash of a string
pub fn hash_string(s: &str) -> Fingerprint {
    let mut hasher = ContentHasher::new();
    hasher.update(s.as_bytes());
    hasher.finalize()
}

/// Compute hash of a file
pub fn hash_file(path: &Path) -> Result<Fingerprint, ReproError> {
    let mut hasher = ContentHasher::new();
    hasher.hash_file(path)?;
    Ok(hasher.finalize())
}

/// Compute hash of a file or a whole directory tree
pub fn hash_path(path: &Path) -> Result<Fingerprint, ReproError> {
    let fingerprint = if path.is_dir() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"dir\0");
        hasher.hash_dir(path)?;
        hasher.finalize()
    } else {
        hash_file(path)?
    };

    trace!(path = %path.display(), %fingerprint, "hashed path");
    Ok(fingerprint)
}

/// Compute hash of a parameter value.
///
/// Values are hashed through their JSON encoding; object keys serialize in
/// sorted order, so equal values always give equal fingerprints.
pub fn hash_value(value: &serde_json::Value) -> Result<Fingerprint, ReproError> {
    let encoded = serde_json::to_string(value)?;
    Ok(hash_string(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_string() {
        let hash1 = hash_string("hello");
        let hash2 = hash_string("hello");
        let hash3 = hash_string("world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.as_str().len(), 64);
    }

    #[test]
    fn test_file_hash_follows_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.csv");

        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let before = hash_path(&path).unwrap();

        std::fs::write(&path, "a,b\n1,3\n").unwrap();
        let after = hash_path(&path).unwrap();

        assert_ne!(before, after);
        assert_eq!(after, hash_string("a,b\n1,3\n"));
    }

    #[test]
    fn test_dir_hash_sees_nested_changes_and_renames() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");
        std::fs::create_dir_all(root.join("raw")).unwrap();
        std::fs::write(root.join("raw/train.csv"), "1").unwrap();
        std::fs::write(root.join("test.csv"), "2").unwrap();

        let original = hash_path(&root).unwrap();
        assert_eq!(original, hash_path(&root).unwrap());

        std::fs::write(root.join("raw/train.csv"), "changed").unwrap();
        let modified = hash_path(&root).unwrap();
        assert_ne!(original, modified);

        std::fs::rename(root.join("test.csv"), root.join("holdout.csv")).unwrap();
        assert_ne!(modified, hash_path(&root).unwrap());
    }

    #[test]
    fn test_value_hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x": 1, "y": [1, 2]}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y": [1, 2], "x": 1}"#).unwrap();
        let c: serde_json::Value = serde_json::from_str(r#"{"x": 2, "y": [1, 2]}"#).unwrap();

        assert_eq!(hash_value(&a).unwrap(), hash_value(&b).unwrap());
        assert_ne!(hash_value(&a).unwrap(), hash_value(&c).unwrap());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = hash_file(Path::new("/nonexistent/file")).unwrap_err();
        assert!(matches!(err, ReproError::FileReadError { .. }));
    }
}
