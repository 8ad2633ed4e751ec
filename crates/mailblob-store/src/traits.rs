use async_trait::async_trait;
use bytes::Bytes;
use mailblob_types::{BlobId, BucketName, StoragePolicy};

use crate::content::{collect, BlobContent, BlobStream};
use crate::error::StoreResult;

/// Backend that stores bytes under caller-supplied ids.
///
/// All implementations must satisfy these invariants:
/// - A blob is readable only once every byte of it has been persisted. A
///   save that fails part way leaves nothing readable under the new id.
/// - Saving under an existing id overwrites it.
/// - Saving into a bucket creates the bucket.
/// - Deleting something that does not exist is not an error.
/// - Reads of an unknown id fail with [`StoreError::NotFound`].
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
#[async_trait]
pub trait BlobStoreDao: Send + Sync {
    /// Persist `content` under `blob_id` in `bucket`.
    async fn save(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        content: BlobContent,
    ) -> StoreResult<()>;

    /// Open a blob for reading.
    ///
    /// Existence is checked before returning, so `NotFound` surfaces here
    /// rather than from the first poll of the stream.
    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream>;

    /// Read a blob fully into memory.
    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        collect(self.read(bucket, blob_id).await?).await
    }

    async fn exists(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<bool>;

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()>;

    /// Delete several blobs of one bucket.
    async fn delete_many(&self, bucket: &BucketName, blob_ids: &[BlobId]) -> StoreResult<()> {
        for blob_id in blob_ids {
            self.delete(bucket, *blob_id).await?;
        }
        Ok(())
    }

    /// Delete a bucket and every blob in it. Missing buckets are a no-op.
    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()>;

    async fn list_buckets(&self) -> StoreResult<Vec<BucketName>>;

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>>;
}

/// Caller-facing blob store: the store picks the id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket used when the caller has no specific namespace. It can never
    /// be deleted.
    fn default_bucket_name(&self) -> &BucketName;

    /// Persist `content` and return the id it is stored under.
    async fn save(
        &self,
        bucket: &BucketName,
        content: BlobContent,
        policy: StoragePolicy,
    ) -> StoreResult<BlobId>;

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream>;

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        collect(self.read(bucket, blob_id).await?).await
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()>;

    /// Delete a bucket. Rejected with `IllegalArgument` for the default
    /// bucket.
    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()>;

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>>;
}
