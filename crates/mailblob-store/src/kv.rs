use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Consistency level requested for a key-value read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadConsistency {
    /// Cheap read that may miss recent writes.
    Weak,
    /// Read that observes every acknowledged write.
    Strong,
}

/// Minimal ordered key-value client the part store runs on.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn put(&self, key: Vec<u8>, value: Bytes) -> StoreResult<()>;

    async fn get(&self, key: &[u8], consistency: ReadConsistency) -> StoreResult<Option<Bytes>>;

    async fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Up to `limit` entries whose key starts with `prefix`, in key order,
    /// strictly after `start_after` when given.
    async fn scan(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> StoreResult<Vec<(Vec<u8>, Bytes)>>;
}

/// In-process ordered map. Every read is strongly consistent.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<Vec<u8>, Bytes>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("key-value store lock poisoned".into())
}

#[async_trait]
impl KvClient for MemoryKvStore {
    async fn put(&self, key: Vec<u8>, value: Bytes) -> StoreResult<()> {
        self.entries.write().map_err(|_| poisoned())?.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &[u8], _consistency: ReadConsistency) -> StoreResult<Option<Bytes>> {
        Ok(self.entries.read().map_err(|_| poisoned())?.get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.entries.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    async fn scan(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> StoreResult<Vec<(Vec<u8>, Bytes)>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let lower = match start_after {
            Some(key) if key >= prefix => Bound::Excluded(key.to_vec()),
            _ => Bound::Included(prefix.to_vec()),
        };
        Ok(entries
            .range((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(limit)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
