use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mailblob_crypto::ContentHasher;
use mailblob_types::{BlobId, BucketName, StoragePolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobStore, BlobStoreDao};

/// How a [`DeduplicatingBlobStore`] assigns ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageStrategy {
    /// Ids derive from content; identical payloads are stored once.
    Deduplication,
    /// Every save gets a fresh random id.
    Passthrough,
}

/// Single-backend [`BlobStore`]: produces the id, then persists through a
/// [`BlobStoreDao`].
pub struct DeduplicatingBlobStore {
    dao: Arc<dyn BlobStoreDao>,
    default_bucket: BucketName,
    strategy: StorageStrategy,
}

impl DeduplicatingBlobStore {
    pub fn new(
        dao: Arc<dyn BlobStoreDao>,
        default_bucket: BucketName,
        strategy: StorageStrategy,
    ) -> Self {
        Self {
            dao,
            default_bucket,
            strategy,
        }
    }

    pub fn deduplicating(dao: Arc<dyn BlobStoreDao>, default_bucket: BucketName) -> Self {
        Self::new(dao, default_bucket, StorageStrategy::Deduplication)
    }

    pub fn passthrough(dao: Arc<dyn BlobStoreDao>, default_bucket: BucketName) -> Self {
        Self::new(dao, default_bucket, StorageStrategy::Passthrough)
    }

    pub fn strategy(&self) -> StorageStrategy {
        self.strategy
    }

    async fn save_deduplicated(
        &self,
        bucket: &BucketName,
        content: BlobContent,
    ) -> StoreResult<BlobId> {
        let (blob_id, content) = match content {
            BlobContent::Bytes(bytes) => (ContentHasher::BLOB.hash(&bytes), BlobContent::Bytes(bytes)),
            other => {
                let spool = other.into_spool().await?;
                (spool.content_id(), BlobContent::Spooled(spool))
            }
        };
        if self.dao.exists(bucket, blob_id).await? {
            debug!(%bucket, %blob_id, "content already stored, skipping write");
            return Ok(blob_id);
        }
        self.dao.save(bucket, blob_id, content).await?;
        Ok(blob_id)
    }
}

#[async_trait]
impl BlobStore for DeduplicatingBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        &self.default_bucket
    }

    async fn save(
        &self,
        bucket: &BucketName,
        content: BlobContent,
        _policy: StoragePolicy,
    ) -> StoreResult<BlobId> {
        let blob_id = match self.strategy {
            StorageStrategy::Deduplication => self.save_deduplicated(bucket, content).await?,
            StorageStrategy::Passthrough => {
                let blob_id = BlobId::random();
                self.dao.save(bucket, blob_id, content).await?;
                blob_id
            }
        };
        debug!(%bucket, %blob_id, strategy = ?self.strategy, "blob saved");
        Ok(blob_id)
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        self.dao.read(bucket, blob_id).await
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        self.dao.read_bytes(bucket, blob_id).await
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        debug!(%bucket, %blob_id, "deleting blob");
        self.dao.delete(bucket, blob_id).await
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        if *bucket == self.default_bucket {
            return Err(StoreError::IllegalArgument(
                "Can not delete the default bucket".into(),
            ));
        }
        debug!(%bucket, "deleting bucket");
        self.dao.delete_bucket(bucket).await
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        self.dao.list_blobs(bucket).await
    }
}

impl std::fmt::Debug for DeduplicatingBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicatingBlobStore")
            .field("default_bucket", &self.default_bucket)
            .field("strategy", &self.strategy)
            .finish()
    }
}
