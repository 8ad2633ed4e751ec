use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mailblob_types::{BlobId, BucketName, StoragePolicy, StorageTier};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::fallback::{both, read_with_fallback};
use crate::traits::BlobStore;

/// Payloads at or above this size go to the low-cost tier under
/// [`StoragePolicy::SizeBased`]: 32 KiB.
pub const DEFAULT_SIZE_THRESHOLD: u64 = 32 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridConfiguration {
    pub size_threshold: u64,
}

impl Default for HybridConfiguration {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_SIZE_THRESHOLD,
        }
    }
}

/// Two-tier store routing writes by [`StoragePolicy`].
///
/// - Saves go to exactly one tier and are never retried on the other.
/// - Reads try low cost first and fall back to high performance on any
///   failure, including "not found".
/// - Deletes are issued to both tiers.
pub struct HybridBlobStore {
    low_cost: Arc<dyn BlobStore>,
    high_performance: Arc<dyn BlobStore>,
    configuration: HybridConfiguration,
}

impl HybridBlobStore {
    /// Both tiers must share a default bucket.
    pub fn new(
        low_cost: Arc<dyn BlobStore>,
        high_performance: Arc<dyn BlobStore>,
        configuration: HybridConfiguration,
    ) -> StoreResult<Self> {
        if low_cost.default_bucket_name() != high_performance.default_bucket_name() {
            return Err(StoreError::InconsistentConfiguration(format!(
                "low-cost and high-performance stores must share a default bucket, got {} and {}",
                low_cost.default_bucket_name(),
                high_performance.default_bucket_name()
            )));
        }
        info!(size_threshold = configuration.size_threshold, "hybrid blob store ready");
        Ok(Self {
            low_cost,
            high_performance,
            configuration,
        })
    }

    pub fn configuration(&self) -> HybridConfiguration {
        self.configuration
    }

    fn tier(&self, tier: StorageTier) -> &Arc<dyn BlobStore> {
        match tier {
            StorageTier::LowCost => &self.low_cost,
            StorageTier::HighPerformance => &self.high_performance,
        }
    }

    /// Pick the target tier. A size-based stream of unknown length is probed
    /// for `size_threshold` bytes: a shorter stream is complete and goes to
    /// high performance as bytes, a longer one is stitched back together and
    /// goes to low cost.
    async fn route(
        &self,
        content: BlobContent,
        policy: StoragePolicy,
    ) -> StoreResult<(StorageTier, BlobContent)> {
        let threshold = self.configuration.size_threshold;
        if let Some(len) = content.len_if_known() {
            return Ok((policy.resolve(len, threshold), content));
        }
        match (policy, content) {
            (StoragePolicy::SizeBased, BlobContent::Stream(mut reader)) => {
                let mut prefix = Vec::new();
                (&mut reader).take(threshold).read_to_end(&mut prefix).await?;
                if (prefix.len() as u64) < threshold {
                    Ok((StorageTier::HighPerformance, BlobContent::from(prefix)))
                } else {
                    let rejoined = Cursor::new(prefix).chain(reader);
                    Ok((StorageTier::LowCost, BlobContent::from_reader(rejoined)))
                }
            }
            // Explicit policies ignore the size.
            (policy, content) => Ok((policy.resolve(0, threshold), content)),
        }
    }
}

#[async_trait]
impl BlobStore for HybridBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        self.low_cost.default_bucket_name()
    }

    async fn save(
        &self,
        bucket: &BucketName,
        content: BlobContent,
        policy: StoragePolicy,
    ) -> StoreResult<BlobId> {
        let (tier, content) = self.route(content, policy).await?;
        debug!(%bucket, %policy, %tier, "hybrid save");
        self.tier(tier).save(bucket, content, policy).await
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        read_with_fallback(
            "low-cost",
            "high-performance",
            self.low_cost.read(bucket, blob_id),
            || self.high_performance.read(bucket, blob_id),
        )
        .await
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        read_with_fallback(
            "low-cost",
            "high-performance",
            self.low_cost.read_bytes(bucket, blob_id),
            || self.high_performance.read_bytes(bucket, blob_id),
        )
        .await
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        let (low, high) = futures::join!(
            self.low_cost.delete(bucket, blob_id),
            self.high_performance.delete(bucket, blob_id)
        );
        both(low, high)
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        if bucket == self.default_bucket_name() {
            return Err(StoreError::IllegalArgument(
                "Can not delete the default bucket".into(),
            ));
        }
        let (low, high) = futures::join!(
            self.low_cost.delete_bucket(bucket),
            self.high_performance.delete_bucket(bucket)
        );
        both(low, high)
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        let mut ids = self.low_cost.list_blobs(bucket).await?;
        ids.extend(self.high_performance.list_blobs(bucket).await?);
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

impl std::fmt::Debug for HybridBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridBlobStore")
            .field("default_bucket", self.default_bucket_name())
            .field("configuration", &self.configuration)
            .finish()
    }
}
