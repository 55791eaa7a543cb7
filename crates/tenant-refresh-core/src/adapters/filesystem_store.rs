//! # Filesystem Key-Value Store
//!
//! Local filesystem implementation of [`KeyValueStore`] and
//! [`ResponseCache`]. Each key is a JSON file under the base directory whose
//! name is the hex encoding of the key, so arbitrary keys (including `:`)
//! are safe on every platform. Keys whose hex form would exceed the file
//! name limit are stored under a SHA-256 digest of the key instead.
//!
//! Every file holds an [`Entry`] carrying the original key, so prefix
//! listing works for both naming schemes.

use crate::store::{KeyValueStore, ResponseCache, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const ENTRY_EXTENSION: &str = "json";

/// Prefix of digest-named entries; never produced by hex encoding
const DIGEST_PREFIX: &str = "sha256-";

/// Longest hex stem used as a file name
///
/// Leaves room under the common 255-byte `NAME_MAX` for the extension and
/// the temp-file suffix used while writing.
const MAX_HEX_STEM_LEN: usize = 200;

/// On-disk layout of one entry
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: Value,
}

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem-based key-value store
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a partially written value.
///
/// # Examples
///
/// ```no_run
/// use tenant_refresh_core::adapters::FilesystemKeyValueStore;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FilesystemKeyValueStore::new(PathBuf::from("./data/kv")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemKeyValueStore {
    base_path: PathBuf,
}

impl FilesystemKeyValueStore {
    /// Create new filesystem store
    ///
    /// # Errors
    ///
    /// Returns error if the base directory cannot be created.
    pub async fn new(base_path: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("Failed to create base directory: {}", e),
            })?;

        Ok(Self { base_path })
    }

    /// Get full path for a key
    fn entry_path(&self, key: &str) -> PathBuf {
        self.base_path.join(Self::file_name(key))
    }

    /// Hex of the key, or a digest of it when the hex form is too long
    fn file_name(key: &str) -> String {
        let stem = hex::encode(key.as_bytes());
        if stem.len() <= MAX_HEX_STEM_LEN {
            return format!("{}.{}", stem, ENTRY_EXTENSION);
        }

        let digest = Sha256::digest(key.as_bytes());
        format!(
            "{}{}.{}",
            DIGEST_PREFIX,
            hex::encode(digest),
            ENTRY_EXTENSION
        )
    }

    /// Recover the key of an entry file, skipping foreign files
    async fn key_of_file(path: &Path, file_name: &str) -> Option<String> {
        let stem = file_name.strip_suffix(&format!(".{}", ENTRY_EXTENSION))?;

        if stem.starts_with(DIGEST_PREFIX) {
            let contents = fs::read(path).await.ok()?;
            let entry: Entry = serde_json::from_slice(&contents).ok()?;
            return Some(entry.key);
        }

        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn remove_entry(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io {
                message: format!("Failed to remove '{}': {}", key, e),
            }),
        }
    }
}

#[async_trait]
impl KeyValueStore for FilesystemKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let contents = match fs::read(self.entry_path(key)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    message: format!("Failed to read '{}': {}", key, e),
                })
            }
        };

        let entry: Entry =
            serde_json::from_slice(&contents).map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        if entry.key != key {
            return Err(StoreError::Serialization {
                key: key.to_string(),
                message: format!("entry file holds key '{}'", entry.key),
            });
        }

        Ok(Some(entry.value))
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let entry = Entry {
            key: key.to_string(),
            value,
        };
        let json = serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let entry_path = self.entry_path(key);
        let temp_path = entry_path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("Failed to create temp file: {}", e),
            })?;

        file.write_all(&json).await.map_err(|e| StoreError::Io {
            message: format!("Failed to write '{}': {}", key, e),
        })?;

        file.flush().await.map_err(|e| StoreError::Io {
            message: format!("Failed to flush '{}': {}", key, e),
        })?;
        drop(file);

        // Rename to final path (atomic on most filesystems)
        fs::rename(&temp_path, &entry_path)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("Failed to rename temp file: {}", e),
            })
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.remove_entry(key).await
    }

    async fn get_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = fs::read_dir(&self.base_path)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("Failed to list store directory: {}", e),
            })?;

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
            message: format!("Failed to read directory entry: {}", e),
        })? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(key) = Self::key_of_file(&entry.path(), file_name).await else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ResponseCache for FilesystemKeyValueStore {
    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.remove_entry(key).await
    }
}

#[cfg(test)]
#[path = "filesystem_store_tests.rs"]
mod tests;
