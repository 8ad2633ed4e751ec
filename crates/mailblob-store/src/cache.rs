use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use mailblob_types::{BlobId, BucketName, StoragePolicy};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::content::{collect, BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::fallback::both;
use crate::traits::{BlobStore, BlobStoreDao};

/// Blobs strictly smaller than this are kept in the cache: 8 KiB.
pub const DEFAULT_CACHE_SIZE_THRESHOLD: u64 = 8 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfiguration {
    pub size_threshold: u64,
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            size_threshold: DEFAULT_CACHE_SIZE_THRESHOLD,
        }
    }
}

/// Read-through cache for small blobs of the default bucket.
///
/// The backend is the source of truth and sees every operation. The cache
/// holds copies keyed by the backend's ids:
/// - saves of small payloads in the default bucket are copied to the cache,
///   except under [`StoragePolicy::LowCost`];
/// - a default-bucket read that misses the cache fills it when the blob is
///   small enough;
/// - a cache that fails is logged and bypassed, never reported to the caller;
/// - deletes in the default bucket reach both.
pub struct CachedBlobStore {
    cache: Arc<dyn BlobStoreDao>,
    backend: Arc<dyn BlobStore>,
    configuration: CacheConfiguration,
}

enum Measured {
    /// Fully read, below the threshold.
    Small(Bytes),
    Large(BlobContent),
}

impl CachedBlobStore {
    pub fn new(
        cache: Arc<dyn BlobStoreDao>,
        backend: Arc<dyn BlobStore>,
        configuration: CacheConfiguration,
    ) -> Self {
        info!(size_threshold = configuration.size_threshold, "blob cache ready");
        Self {
            cache,
            backend,
            configuration,
        }
    }

    pub fn configuration(&self) -> CacheConfiguration {
        self.configuration
    }

    fn is_cached_bucket(&self, bucket: &BucketName) -> bool {
        bucket == self.backend.default_bucket_name()
    }

    fn fits(&self, len: u64) -> bool {
        len < self.configuration.size_threshold
    }

    /// Classify a payload against the threshold. Streams are read at most
    /// `size_threshold` bytes ahead; a longer one is put back together.
    async fn measure(&self, content: BlobContent) -> StoreResult<Measured> {
        let threshold = self.configuration.size_threshold;
        match content.len_if_known() {
            Some(len) if self.fits(len) => Ok(Measured::Small(content.into_bytes().await?)),
            Some(_) => Ok(Measured::Large(content)),
            None => match content {
                BlobContent::Stream(mut reader) => {
                    let mut prefix = Vec::new();
                    (&mut reader).take(threshold).read_to_end(&mut prefix).await?;
                    if self.fits(prefix.len() as u64) {
                        Ok(Measured::Small(Bytes::from(prefix)))
                    } else {
                        let rejoined = Cursor::new(prefix).chain(reader);
                        Ok(Measured::Large(BlobContent::from_reader(rejoined)))
                    }
                }
                other => Ok(Measured::Large(other)),
            },
        }
    }

    async fn lookup(&self, blob_id: BlobId) -> Option<Bytes> {
        match self
            .cache
            .read_bytes(self.default_bucket_name(), blob_id)
            .await
        {
            Ok(bytes) => {
                debug!(%blob_id, "blob cache hit");
                Some(bytes)
            }
            Err(err) if err.is_not_found() => {
                debug!(%blob_id, "blob cache miss");
                None
            }
            Err(err) => {
                warn!(%blob_id, error = %err, "blob cache read failed, using backend");
                None
            }
        }
    }

    async fn fill(&self, blob_id: BlobId, bytes: Bytes) {
        if let Err(err) = self
            .cache
            .save(self.default_bucket_name(), blob_id, bytes.into())
            .await
        {
            warn!(%blob_id, error = %err, "failed to populate blob cache");
        }
    }
}

#[async_trait]
impl BlobStore for CachedBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        self.backend.default_bucket_name()
    }

    async fn save(
        &self,
        bucket: &BucketName,
        content: BlobContent,
        policy: StoragePolicy,
    ) -> StoreResult<BlobId> {
        if !self.is_cached_bucket(bucket) || policy == StoragePolicy::LowCost {
            return self.backend.save(bucket, content, policy).await;
        }
        match self.measure(content).await? {
            Measured::Small(bytes) => {
                let blob_id = self.backend.save(bucket, bytes.clone().into(), policy).await?;
                self.fill(blob_id, bytes).await;
                Ok(blob_id)
            }
            Measured::Large(content) => self.backend.save(bucket, content, policy).await,
        }
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        if !self.is_cached_bucket(bucket) {
            return self.backend.read(bucket, blob_id).await;
        }
        if let Some(bytes) = self.lookup(blob_id).await {
            return Ok(stream::once(async move { Ok::<_, StoreError>(bytes) }).boxed());
        }

        let mut source = self.backend.read(bucket, blob_id).await?;
        let mut head = Vec::new();
        let mut len = 0u64;
        while self.fits(len) {
            match source.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    len += chunk.len() as u64;
                    head.push(chunk);
                }
                None => {
                    let bytes = collect(stream::iter(head.into_iter().map(Ok)).boxed()).await?;
                    self.fill(blob_id, bytes.clone()).await;
                    return Ok(stream::once(async move { Ok::<_, StoreError>(bytes) }).boxed());
                }
            }
        }
        Ok(stream::iter(head.into_iter().map(Ok)).chain(source).boxed())
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        if !self.is_cached_bucket(bucket) {
            return self.backend.read_bytes(bucket, blob_id).await;
        }
        if let Some(bytes) = self.lookup(blob_id).await {
            return Ok(bytes);
        }
        let bytes = self.backend.read_bytes(bucket, blob_id).await?;
        if self.fits(bytes.len() as u64) {
            self.fill(blob_id, bytes.clone()).await;
        }
        Ok(bytes)
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        if !self.is_cached_bucket(bucket) {
            return self.backend.delete(bucket, blob_id).await;
        }
        let (cache, backend) = futures::join!(
            self.cache.delete(bucket, blob_id),
            self.backend.delete(bucket, blob_id)
        );
        both(backend, cache)
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        if self.is_cached_bucket(bucket) {
            return Err(StoreError::IllegalArgument(
                "Can not delete the default bucket".into(),
            ));
        }
        self.backend.delete_bucket(bucket).await
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        self.backend.list_blobs(bucket).await
    }
}

impl std::fmt::Debug for CachedBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedBlobStore")
            .field("default_bucket", self.default_bucket_name())
            .field("configuration", &self.configuration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DeduplicatingBlobStore;
    use crate::memory::MemoryBlobStoreDao;
    use crate::testing::{FailingBlobStore, FailingBlobStoreDao};
    use futures::TryStreamExt;

    const THRESHOLD: u64 = 64;

    struct Fixture {
        cache: Arc<MemoryBlobStoreDao>,
        backend: Arc<dyn BlobStore>,
        store: CachedBlobStore,
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(MemoryBlobStoreDao::new());
        let backend: Arc<dyn BlobStore> = Arc::new(DeduplicatingBlobStore::deduplicating(
            Arc::new(MemoryBlobStoreDao::new()),
            BucketName::default(),
        ));
        Fixture {
            store: CachedBlobStore::new(
                cache.clone(),
                backend.clone(),
                CacheConfiguration {
                    size_threshold: THRESHOLD,
                },
            ),
            cache,
            backend,
        }
    }

    fn default_bucket() -> BucketName {
        BucketName::default()
    }

    fn small() -> Bytes {
        Bytes::from(vec![5u8; THRESHOLD as usize - 1])
    }

    fn big() -> Bytes {
        Bytes::from((0..THRESHOLD * 4).map(|i| i as u8).collect::<Vec<u8>>())
    }

    impl Fixture {
        async fn cached(&self, blob_id: BlobId) -> Option<Bytes> {
            match self.cache.read_bytes(&default_bucket(), blob_id).await {
                Ok(bytes) => Some(bytes),
                Err(err) if err.is_not_found() => None,
                Err(err) => panic!("unexpected cache error: {err}"),
            }
        }

        async fn in_backend(&self, bucket: &BucketName, blob_id: BlobId) -> Bytes {
            self.backend.read_bytes(bucket, blob_id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn small_size_based_save_lands_in_cache_and_backend() {
        let f = fixture();
        let id = f
            .store
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, Some(small()));
        assert_eq!(f.in_backend(&default_bucket(), id).await, small());
    }

    #[tokio::test]
    async fn high_performance_save_is_cached() {
        let f = fixture();
        let id = f
            .store
            .save(&default_bucket(), small().into(), StoragePolicy::HighPerformance)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, Some(small()));
        assert_eq!(f.in_backend(&default_bucket(), id).await, small());
    }

    #[tokio::test]
    async fn low_cost_save_bypasses_cache() {
        let f = fixture();
        let id = f
            .store
            .save(&default_bucket(), small().into(), StoragePolicy::LowCost)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, None);
        assert_eq!(f.in_backend(&default_bucket(), id).await, small());
    }

    #[tokio::test]
    async fn other_buckets_are_not_cached() {
        let f = fixture();
        let archive = BucketName::new("archive").unwrap();
        let id = f
            .store
            .save(&archive, small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, None);
        assert_eq!(f.store.read_bytes(&archive, id).await.unwrap(), small());
        assert_eq!(f.cached(id).await, None);
        assert!(f.cache.is_empty());
    }

    #[tokio::test]
    async fn payloads_at_threshold_are_not_cached() {
        let f = fixture();
        let at_threshold = Bytes::from(vec![1u8; THRESHOLD as usize]);
        let id = f
            .store
            .save(&default_bucket(), at_threshold.clone().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, None);
        assert_eq!(f.in_backend(&default_bucket(), id).await, at_threshold);
    }

    #[tokio::test]
    async fn streams_are_measured_before_caching() {
        let f = fixture();
        let small_id = f
            .store
            .save(
                &default_bucket(),
                BlobContent::from_reader(Cursor::new(small().to_vec())),
                StoragePolicy::SizeBased,
            )
            .await
            .unwrap();
        assert_eq!(f.cached(small_id).await, Some(small()));

        let empty_id = f
            .store
            .save(
                &default_bucket(),
                BlobContent::from_reader(Cursor::new(Vec::new())),
                StoragePolicy::SizeBased,
            )
            .await
            .unwrap();
        assert_eq!(f.cached(empty_id).await, Some(Bytes::new()));

        let big_id = f
            .store
            .save(
                &default_bucket(),
                BlobContent::from_reader(Cursor::new(big().to_vec())),
                StoragePolicy::SizeBased,
            )
            .await
            .unwrap();
        assert_eq!(f.cached(big_id).await, None);
        assert_eq!(f.in_backend(&default_bucket(), big_id).await, big());
    }

    #[tokio::test]
    async fn read_bytes_fills_cache_for_small_blobs() {
        let f = fixture();
        let id = f
            .backend
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        assert_eq!(f.cached(id).await, None);

        assert_eq!(f.store.read_bytes(&default_bucket(), id).await.unwrap(), small());
        assert_eq!(f.cached(id).await, Some(small()));
    }

    #[tokio::test]
    async fn streaming_read_fills_cache_for_small_blobs() {
        let f = fixture();
        let id = f
            .backend
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();

        let streamed = collect(f.store.read(&default_bucket(), id).await.unwrap())
            .await
            .unwrap();
        assert_eq!(streamed, small());
        assert_eq!(f.cached(id).await, Some(small()));
    }

    #[tokio::test]
    async fn big_blobs_are_never_filled() {
        let f = fixture();
        let id = f
            .backend
            .save(&default_bucket(), big().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();

        assert_eq!(f.store.read_bytes(&default_bucket(), id).await.unwrap(), big());
        let parts: Vec<Bytes> = f
            .store
            .read(&default_bucket(), id)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(parts.concat(), big().to_vec());
        assert_eq!(f.cached(id).await, None);
    }

    #[tokio::test]
    async fn hits_are_served_from_cache() {
        let f = fixture();
        let id = BlobId::random();
        f.cache
            .save(&default_bucket(), id, "cached copy".into())
            .await
            .unwrap();
        assert_eq!(
            f.store.read_bytes(&default_bucket(), id).await.unwrap(),
            Bytes::from_static(b"cached copy")
        );
    }

    #[tokio::test]
    async fn failing_cache_is_bypassed() {
        let backend: Arc<dyn BlobStore> = Arc::new(DeduplicatingBlobStore::deduplicating(
            Arc::new(MemoryBlobStoreDao::new()),
            BucketName::default(),
        ));
        let store = CachedBlobStore::new(
            Arc::new(FailingBlobStoreDao),
            backend.clone(),
            CacheConfiguration {
                size_threshold: THRESHOLD,
            },
        );

        let id = store
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        assert_eq!(backend.read_bytes(&default_bucket(), id).await.unwrap(), small());
        assert_eq!(store.read_bytes(&default_bucket(), id).await.unwrap(), small());
        let streamed = collect(store.read(&default_bucket(), id).await.unwrap())
            .await
            .unwrap();
        assert_eq!(streamed, small());
    }

    #[tokio::test]
    async fn backend_faults_are_reported() {
        let store = CachedBlobStore::new(
            Arc::new(MemoryBlobStoreDao::new()),
            Arc::new(FailingBlobStore::default()),
            CacheConfiguration::default(),
        );
        let err = store
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap_err();
        assert!(err.is_object_store_fault());
        assert!(store.read_bytes(&default_bucket(), BlobId::random()).await.is_err());
    }

    #[tokio::test]
    async fn delete_reaches_cache_and_backend() {
        let f = fixture();
        let id = f
            .store
            .save(&default_bucket(), small().into(), StoragePolicy::SizeBased)
            .await
            .unwrap();
        f.store.delete(&default_bucket(), id).await.unwrap();

        assert_eq!(f.cached(id).await, None);
        assert!(f
            .backend
            .read_bytes(&default_bucket(), id)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(f.store.read_bytes(&default_bucket(), id).await.unwrap_err().is_not_found());
        f.store.delete(&default_bucket(), id).await.unwrap();
    }

    #[tokio::test]
    async fn default_bucket_cannot_be_deleted() {
        let f = fixture();
        let err = f.store.delete_bucket(&default_bucket()).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalArgument(_)));

        let archive = BucketName::new("archive").unwrap();
        f.store
            .save(&archive, "old".into(), StoragePolicy::LowCost)
            .await
            .unwrap();
        f.store.delete_bucket(&archive).await.unwrap();
        assert!(f.store.list_blobs(&archive).await.unwrap().is_empty());
    }
}
