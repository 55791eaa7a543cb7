//! # In-Memory Key-Value Store
//!
//! Thread-safe in-memory store for testing, development and single-instance
//! deployments. Implements both [`KeyValueStore`] and [`ResponseCache`] so
//! the same type can back either role.

use crate::store::{KeyValueStore, ResponseCache, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

/// Thread-safe in-memory key-value store
///
/// Clones share the same underlying map. Keys are kept ordered so prefix
/// scans are a range walk.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl InMemoryKeyValueStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create store pre-populated with entries
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.write();
            for (key, value) in entries {
                map.insert(key.into(), value);
            }
        } // Lock dropped here
        store
    }

    /// Snapshot of all keys, in order
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Whether `key` currently exists
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// True when the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.write().remove(key);
        Ok(())
    }

    async fn get_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[async_trait]
impl ResponseCache for InMemoryKeyValueStore {
    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
