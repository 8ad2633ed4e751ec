use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use mailblob_types::{BlobId, BucketName};
use tracing::debug;

use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStoreDao;

type Buckets = HashMap<BucketName, HashMap<BlobId, Bytes>>;

/// In-memory, HashMap-based blob DAO.
///
/// Intended for tests and embedding. Every blob is held as one contiguous
/// buffer behind a `RwLock`; reads hand out cheap `Bytes` clones.
pub struct MemoryBlobStoreDao {
    buckets: RwLock<Buckets>,
}

impl MemoryBlobStoreDao {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs across all buckets.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .expect("lock poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.buckets
            .read()
            .expect("lock poisoned")
            .values()
            .flat_map(HashMap::values)
            .map(|blob| blob.len() as u64)
            .sum()
    }

    /// Remove every bucket and blob.
    pub fn clear(&self) {
        self.buckets.write().expect("lock poisoned").clear();
    }

    fn get(&self, bucket: &BucketName, blob_id: BlobId) -> Option<Bytes> {
        self.buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .and_then(|blobs| blobs.get(&blob_id))
            .cloned()
    }
}

impl Default for MemoryBlobStoreDao {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStoreDao for MemoryBlobStoreDao {
    async fn save(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        content: BlobContent,
    ) -> StoreResult<()> {
        // Fully materialize before taking the lock: a failing source never
        // replaces an existing entry.
        let data = content.into_bytes().await?;
        debug!(%bucket, %blob_id, size = data.len(), "memory save");
        self.buckets
            .write()
            .expect("lock poisoned")
            .entry(bucket.clone())
            .or_default()
            .insert(blob_id, data);
        Ok(())
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        let data = self
            .get(bucket, blob_id)
            .ok_or_else(|| StoreError::not_found(bucket, blob_id))?;
        Ok(stream::once(async move { Ok(data) }).boxed())
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        self.get(bucket, blob_id)
            .ok_or_else(|| StoreError::not_found(bucket, blob_id))
    }

    async fn exists(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<bool> {
        Ok(self.get(bucket, blob_id).is_some())
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        let mut buckets = self.buckets.write().expect("lock poisoned");
        if let Some(blobs) = buckets.get_mut(bucket) {
            blobs.remove(&blob_id);
        }
        Ok(())
    }

    async fn delete_many(&self, bucket: &BucketName, blob_ids: &[BlobId]) -> StoreResult<()> {
        let mut buckets = self.buckets.write().expect("lock poisoned");
        if let Some(blobs) = buckets.get_mut(bucket) {
            for blob_id in blob_ids {
                blobs.remove(blob_id);
            }
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        self.buckets.write().expect("lock poisoned").remove(bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketName>> {
        let mut names: Vec<BucketName> = self
            .buckets
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        let mut ids: Vec<BlobId> = self
            .buckets
            .read()
            .expect("lock poisoned")
            .get(bucket)
            .map(|blobs| blobs.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for MemoryBlobStoreDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlobStoreDao")
            .field("blob_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingReader;

    fn bucket(name: &str) -> BucketName {
        BucketName::new(name).unwrap()
    }

    #[tokio::test]
    async fn save_and_read_back() {
        let dao = MemoryBlobStoreDao::new();
        let id = BlobId::random();
        dao.save(&bucket("b"), id, "hello".into()).await.unwrap();

        assert_eq!(
            dao.read_bytes(&bucket("b"), id).await.unwrap(),
            Bytes::from_static(b"hello")
        );
        assert_eq!(
            crate::content::collect(dao.read(&bucket("b"), id).await.unwrap())
                .await
                .unwrap(),
            Bytes::from_static(b"hello")
        );
        assert!(dao.exists(&bucket("b"), id).await.unwrap());
        assert_eq!(dao.total_bytes(), 5);
    }

    #[tokio::test]
    async fn unknown_blob_is_not_found() {
        let dao = MemoryBlobStoreDao::new();
        let err = dao.read(&bucket("b"), BlobId::random()).await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn buckets_are_isolated() {
        let dao = MemoryBlobStoreDao::new();
        let id = BlobId::random();
        dao.save(&bucket("one"), id, "x".into()).await.unwrap();
        assert!(!dao.exists(&bucket("two"), id).await.unwrap());
    }

    #[tokio::test]
    async fn save_overwrites() {
        let dao = MemoryBlobStoreDao::new();
        let id = BlobId::random();
        dao.save(&bucket("b"), id, "first".into()).await.unwrap();
        dao.save(&bucket("b"), id, "second".into()).await.unwrap();
        assert_eq!(
            dao.read_bytes(&bucket("b"), id).await.unwrap(),
            Bytes::from_static(b"second")
        );
        assert_eq!(dao.len(), 1);
    }

    #[tokio::test]
    async fn failing_stream_keeps_previous_content() {
        let dao = MemoryBlobStoreDao::new();
        let id = BlobId::random();
        dao.save(&bucket("b"), id, "stable".into()).await.unwrap();
        let result = dao
            .save(&bucket("b"), id, BlobContent::from_reader(FailingReader::after(3)))
            .await;
        assert!(result.is_err());
        assert_eq!(
            dao.read_bytes(&bucket("b"), id).await.unwrap(),
            Bytes::from_static(b"stable")
        );
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dao = MemoryBlobStoreDao::new();
        let id = BlobId::random();
        dao.save(&bucket("b"), id, "x".into()).await.unwrap();
        dao.delete(&bucket("b"), id).await.unwrap();
        dao.delete(&bucket("b"), id).await.unwrap();
        dao.delete(&bucket("missing"), id).await.unwrap();
        assert!(dao.is_empty());
    }

    #[tokio::test]
    async fn delete_many_and_bucket() {
        let dao = MemoryBlobStoreDao::new();
        let ids: Vec<BlobId> = (0..3).map(|_| BlobId::random()).collect();
        for id in &ids {
            dao.save(&bucket("b"), *id, "x".into()).await.unwrap();
        }
        dao.save(&bucket("other"), ids[0], "y".into()).await.unwrap();

        dao.delete_many(&bucket("b"), &ids[..2]).await.unwrap();
        assert_eq!(dao.list_blobs(&bucket("b")).await.unwrap(), vec![ids[2]]);

        dao.delete_bucket(&bucket("b")).await.unwrap();
        dao.delete_bucket(&bucket("never-created")).await.unwrap();
        assert_eq!(dao.list_buckets().await.unwrap(), vec![bucket("other")]);
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let dao = MemoryBlobStoreDao::new();
        dao.save(&bucket("b"), BlobId::random(), "x".into()).await.unwrap();
        dao.clear();
        assert!(dao.is_empty());
        assert!(dao.list_buckets().await.unwrap().is_empty());
    }
}
