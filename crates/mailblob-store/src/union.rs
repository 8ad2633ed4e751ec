use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mailblob_types::{BlobId, BucketName, StoragePolicy};
use tracing::{debug, info};

use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::fallback::read_with_fallback;
use crate::traits::BlobStore;

/// Migration store: writes and deletes go to `current`, reads fall back to
/// `legacy`.
///
/// Legacy data is never modified through this store; it is expected to age
/// out on its own.
pub struct UnionBlobStore {
    current: Arc<dyn BlobStore>,
    legacy: Arc<dyn BlobStore>,
}

impl UnionBlobStore {
    pub fn new(current: Arc<dyn BlobStore>, legacy: Arc<dyn BlobStore>) -> StoreResult<Self> {
        if current.default_bucket_name() != legacy.default_bucket_name() {
            return Err(StoreError::InconsistentConfiguration(format!(
                "current and legacy stores must share a default bucket, got {} and {}",
                current.default_bucket_name(),
                legacy.default_bucket_name()
            )));
        }
        info!("union blob store ready");
        Ok(Self { current, legacy })
    }
}

#[async_trait]
impl BlobStore for UnionBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        self.current.default_bucket_name()
    }

    async fn save(
        &self,
        bucket: &BucketName,
        content: BlobContent,
        policy: StoragePolicy,
    ) -> StoreResult<BlobId> {
        debug!(%bucket, %policy, "union save to current");
        self.current.save(bucket, content, policy).await
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        read_with_fallback(
            "current",
            "legacy",
            self.current.read(bucket, blob_id),
            || self.legacy.read(bucket, blob_id),
        )
        .await
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        read_with_fallback(
            "current",
            "legacy",
            self.current.read_bytes(bucket, blob_id),
            || self.legacy.read_bytes(bucket, blob_id),
        )
        .await
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        self.current.delete(bucket, blob_id).await
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        if bucket == self.default_bucket_name() {
            return Err(StoreError::IllegalArgument(
                "Can not delete the default bucket".into(),
            ));
        }
        self.current.delete_bucket(bucket).await
    }

    /// Blobs visible through this store: current and legacy combined.
    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        let mut ids = self.current.list_blobs(bucket).await?;
        ids.extend(self.legacy.list_blobs(bucket).await?);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for UnionBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnionBlobStore")
            .field("default_bucket", self.default_bucket_name())
            .finish()
    }
}
