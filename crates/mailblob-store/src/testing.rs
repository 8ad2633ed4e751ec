//! Test doubles shared by the unit tests of this crate.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use mailblob_types::{BlobId, BucketName, StoragePolicy};
use tokio::io::{AsyncRead, ReadBuf};

use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::kv::{KvClient, MemoryKvStore, ReadConsistency};
use crate::traits::{BlobStore, BlobStoreDao};

fn backend_down() -> StoreError {
    StoreError::Backend("backend unavailable".into())
}

/// Fails every operation before doing any work.
#[derive(Debug, Default)]
pub struct FailingBlobStore {
    default_bucket: BucketName,
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        &self.default_bucket
    }

    async fn save(&self, _: &BucketName, _: BlobContent, _: StoragePolicy) -> StoreResult<BlobId> {
        Err(backend_down())
    }

    async fn read(&self, _: &BucketName, _: BlobId) -> StoreResult<BlobStream> {
        Err(backend_down())
    }

    async fn read_bytes(&self, _: &BucketName, _: BlobId) -> StoreResult<Bytes> {
        Err(backend_down())
    }

    async fn delete(&self, _: &BucketName, _: BlobId) -> StoreResult<()> {
        Err(backend_down())
    }

    async fn delete_bucket(&self, _: &BucketName) -> StoreResult<()> {
        Err(backend_down())
    }

    async fn list_blobs(&self, _: &BucketName) -> StoreResult<Vec<BlobId>> {
        Err(backend_down())
    }
}

/// Suspends once, then fails: a failure that only shows up after the
/// operation has started running.
#[derive(Debug, Default)]
pub struct DelayedFailingBlobStore {
    default_bucket: BucketName,
}

async fn fail_later<T>() -> StoreResult<T> {
    tokio::task::yield_now().await;
    Err(backend_down())
}

#[async_trait]
impl BlobStore for DelayedFailingBlobStore {
    fn default_bucket_name(&self) -> &BucketName {
        &self.default_bucket
    }

    async fn save(&self, _: &BucketName, content: BlobContent, _: StoragePolicy) -> StoreResult<BlobId> {
        // Consume the payload first, like a real backend would.
        content.into_bytes().await?;
        fail_later().await
    }

    async fn read(&self, _: &BucketName, _: BlobId) -> StoreResult<BlobStream> {
        fail_later().await
    }

    async fn delete(&self, _: &BucketName, _: BlobId) -> StoreResult<()> {
        fail_later().await
    }

    async fn delete_bucket(&self, _: &BucketName) -> StoreResult<()> {
        fail_later().await
    }

    async fn list_blobs(&self, _: &BucketName) -> StoreResult<Vec<BlobId>> {
        fail_later().await
    }
}

/// DAO whose every operation fails, standing in for an unreachable cache.
#[derive(Debug, Default)]
pub struct FailingBlobStoreDao;

#[async_trait]
impl BlobStoreDao for FailingBlobStoreDao {
    async fn save(&self, _: &BucketName, _: BlobId, _: BlobContent) -> StoreResult<()> {
        Err(backend_down())
    }

    async fn read(&self, _: &BucketName, _: BlobId) -> StoreResult<BlobStream> {
        Err(backend_down())
    }

    async fn exists(&self, _: &BucketName, _: BlobId) -> StoreResult<bool> {
        Err(backend_down())
    }

    async fn delete(&self, _: &BucketName, _: BlobId) -> StoreResult<()> {
        Err(backend_down())
    }

    async fn delete_bucket(&self, _: &BucketName) -> StoreResult<()> {
        Err(backend_down())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketName>> {
        Err(backend_down())
    }

    async fn list_blobs(&self, _: &BucketName) -> StoreResult<Vec<BlobId>> {
        Err(backend_down())
    }
}

/// Reader that yields `remaining` zero bytes, then an I/O error.
pub struct FailingReader {
    remaining: usize,
}

impl FailingReader {
    pub fn after(bytes: usize) -> Self {
        Self { remaining: bytes }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "source stream broke",
            )));
        }
        let n = self.remaining.min(buf.remaining());
        buf.put_slice(&vec![0u8; n]);
        self.remaining -= n;
        Poll::Ready(Ok(()))
    }
}

/// Key-value client whose weak reads miss every key once lagging is turned
/// on, as a replica that has not caught up would. Strong reads always see
/// the data.
#[derive(Debug, Default)]
pub struct LaggingKv {
    inner: MemoryKvStore,
    lagging: AtomicBool,
}

impl LaggingKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lag_all(&self) {
        self.lagging.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KvClient for LaggingKv {
    async fn put(&self, key: Vec<u8>, value: Bytes) -> StoreResult<()> {
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &[u8], consistency: ReadConsistency) -> StoreResult<Option<Bytes>> {
        if consistency == ReadConsistency::Weak && self.lagging.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get(key, consistency).await
    }

    async fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn scan(
        &self,
        prefix: &[u8],
        start_after: Option<&[u8]>,
        limit: usize,
    ) -> StoreResult<Vec<(Vec<u8>, Bytes)>> {
        self.inner.scan(prefix, start_after, limit).await
    }
}
