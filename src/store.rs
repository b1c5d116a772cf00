//! Durable key-value persistence for usage records.
//!
//! A [`UsageStore`] maps string keys to JSON blobs, one file per key under
//! a data directory. Writes are synchronous: every mutation of the
//! aggregated totals is on disk before the call returns, so a crash between
//! ticks loses at most one tick's worth of delta.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Errors from the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode record {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
    #[error("failed to encode record {key}: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Directory-backed string-key → JSON-blob store.
pub struct UsageStore {
    dir: PathBuf,
}

impl UsageStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        debug!("Usage store opened at {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Reads and decodes the record stored under `key`.
    ///
    /// Returns `Ok(None)` when the key has never been written. A present
    /// but undecodable record is an error; the aggregator collapses it to
    /// a default value at load time.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
            key: key.to_string(),
            source: e,
        })?;
        Ok(Some(value))
    }

    /// Encodes `value` and writes it under `key`, synchronously.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Encode {
            key: key.to_string(),
            source: e,
        })?;

        let path = self.path_for(key);
        fs::write(&path, bytes).map_err(|e| StoreError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Removes the record stored under `key`. Removing an absent key is
    /// not an error.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageTotals;

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path()).unwrap();

        let totals = UsageTotals {
            sent: 10,
            received: 20,
            total: 30,
        };
        store.put("all-time", &totals).unwrap();

        let loaded: Option<UsageTotals> = store.get("all-time").unwrap();
        assert_eq!(loaded, Some(totals));
    }

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path()).unwrap();

        let loaded: Option<UsageTotals> = store.get("never-written").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_record_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("all-time.json"), b"not json").unwrap();
        let result: Result<Option<UsageTotals>, _> = store.get("all-time");
        assert!(matches!(result, Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path()).unwrap();

        store.put("key", &1u64).unwrap();
        store.remove("key").unwrap();
        store.remove("key").unwrap();

        let loaded: Option<u64> = store.get("key").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = UsageStore::open(dir.path()).unwrap();
            store.put("key", &42u64).unwrap();
        }
        let store = UsageStore::open(dir.path()).unwrap();
        let loaded: Option<u64> = store.get("key").unwrap();
        assert_eq!(loaded, Some(42));
    }
}
