// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered key/value storage.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use murmur_core::ErrorKind;
use thiserror::Error;

/// An ordered key/value store with prefix scans.
///
/// Writers are serialized; readers see a consistent view per call.
/// Prefix deletion is atomic.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError>;

    /// All entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    /// Every entry in the store, in key order.
    async fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;

    /// Remove every entry whose key starts with `prefix` in one
    /// transaction; returns the number of removed entries.
    async fn delete_prefix(&self, prefix: &[u8]) -> Result<usize, KvError>;
}

/// In-memory [`OrderedStore`] over a B-tree map.
///
/// Cloning is cheap and clones share the same store.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("acquire shared read access on store")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let inner = self
            .inner
            .read()
            .expect("acquire shared read access on store");
        Ok(inner.get(key).cloned())
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), KvError> {
        let mut inner = self
            .inner
            .write()
            .expect("acquire exclusive write access on store");
        inner.insert(key, value);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let inner = self
            .inner
            .read()
            .expect("acquire shared read access on store");
        Ok(inner
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn scan_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        let inner = self
            .inner
            .read()
            .expect("acquire shared read access on store");
        Ok(inner
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn delete_prefix(&self, prefix: &[u8]) -> Result<usize, KvError> {
        let mut inner = self
            .inner
            .write()
            .expect("acquire exclusive write access on store");
        let doomed: Vec<Vec<u8>> = inner
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            inner.remove(key);
        }
        Ok(doomed.len())
    }
}

#[derive(Error, Debug)]
pub enum KvError {
    #[error("key/value store unavailable: {0}")]
    Store(String),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryStore, OrderedStore};

    #[tokio::test]
    async fn put_get_overwrite() {
        let store = MemoryStore::new();
        store.put(b"k".to_vec(), b"1".to_vec()).await.unwrap();
        store.put(b"k".to_vec(), b"2".to_vec()).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn prefix_scan_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        for key in [&b"aa1"[..], b"aa2", b"ab1", b"b"] {
            store.put(key.to_vec(), b"v".to_vec()).await.unwrap();
        }

        let hits = store.scan_prefix(b"aa").await.unwrap();
        let keys: Vec<_> = hits.iter().map(|(key, _)| key.as_slice()).collect();
        assert_eq!(keys, vec![&b"aa1"[..], b"aa2"]);
    }

    #[tokio::test]
    async fn delete_prefix_is_complete() {
        let store = MemoryStore::new();
        for key in [&b"aa1"[..], b"aa2", b"ab"] {
            store.put(key.to_vec(), b"v".to_vec()).await.unwrap();
        }

        assert_eq!(store.delete_prefix(b"aa").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(b"ab").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.delete_prefix(b"aa").await.unwrap(), 0);
    }
}
