//! Durable local storage: one JSON record per namespaced key.
//!
//! Backs the persisted session record and the favorite/saved id-sets. Each
//! key maps to `<storage_dir>/<key>.json`, written atomically (serialize to
//! a temp file, then rename into place) so a crash mid-write never leaves a
//! partially-written record. Records are readable at startup before any
//! network call completes.
//!
//! Malformed or unreadable records are treated as absent with a `warn!`,
//! never as fatal errors: a corrupted favorites file must not take the
//! client down.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::api::error::ApiError;

/// Keyed durable JSON records under a storage directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Create a store, ensuring the storage directory exists.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The storage root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ApiError> {
        let final_path = self.key_path(key);
        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| ApiError::Storage(format!("failed to serialize {key}: {e}")))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| ApiError::Storage(format!("failed to write temp record for {key}: {e}")))?;
        std::fs::rename(&tmp_path, &final_path)
            .map_err(|e| ApiError::Storage(format!("failed to rename record for {key}: {e}")))?;
        Ok(())
    }

    /// Read a record. Absent, unreadable, and malformed records all read as
    /// `None`; the latter two log a warning.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.key_path(key);
        if !path.exists() {
            return None;
        }
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) => {
                warn!("Skipping unreadable record at {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Skipping malformed record at {}: {e}", path.display());
                None
            }
        }
    }

    /// Delete a record. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), ApiError> {
        let path = self.key_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| ApiError::Storage(format!("failed to remove record for {key}: {e}")))?;
        }
        Ok(())
    }
}
