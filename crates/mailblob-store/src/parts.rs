//! Part Store DAO: chunk records and per-blob part counts over a key-value
//! client.
//!
//! Key layout (`\0` cannot occur in bucket names or ids):
//!
//! ```text
//! m \0 <bucket> \0 <blob-id>                 -> part count, u32 big-endian
//! p \0 <bucket> \0 <blob-id> \0 <position>   -> part bytes, position u32 big-endian
//! ```
//!
//! The metadata record is the commit signal: it is written only after every
//! part is acknowledged, and removed before any part is deleted.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use mailblob_types::{BlobId, BucketName};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::kv::{KvClient, ReadConsistency};

const META_TAG: u8 = b'm';
const PART_TAG: u8 = b'p';
const SEPARATOR: u8 = 0;

/// Entries fetched per scan request when listing or bulk deleting.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub struct PartStoreDao {
    kv: Arc<dyn KvClient>,
    page_size: usize,
}

impl PartStoreDao {
    pub fn new(kv: Arc<dyn KvClient>) -> Self {
        Self::with_page_size(kv, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(kv: Arc<dyn KvClient>, page_size: usize) -> Self {
        Self {
            kv,
            page_size: page_size.max(1),
        }
    }

    /// Upsert one part. Last writer wins.
    pub async fn write_part(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        position: u32,
        data: Bytes,
    ) -> StoreResult<()> {
        self.kv.put(part_key(bucket, blob_id, position), data).await
    }

    /// Read one part at the given consistency. `None` means the part is
    /// absent, which is not an error at this layer.
    pub async fn read_part(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        position: u32,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<Bytes>> {
        self.kv
            .get(&part_key(bucket, blob_id, position), consistency)
            .await
    }

    /// Weak read, retried at strong consistency when the part looks absent.
    pub async fn read_part_with_fallback(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        position: u32,
    ) -> StoreResult<Option<Bytes>> {
        if let Some(part) = self
            .read_part(bucket, blob_id, position, ReadConsistency::Weak)
            .await?
        {
            return Ok(Some(part));
        }
        warn!(%bucket, %blob_id, position, "part absent at weak consistency, retrying strong");
        self.read_part(bucket, blob_id, position, ReadConsistency::Strong)
            .await
    }

    /// Commit a blob by recording its part count. Callers must have every
    /// part acknowledged before calling this.
    pub async fn save_blob_parts_references(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        part_count: u32,
    ) -> StoreResult<()> {
        debug!(%bucket, %blob_id, part_count, "committing blob");
        self.kv
            .put(
                meta_key(bucket, blob_id),
                Bytes::copy_from_slice(&part_count.to_be_bytes()),
            )
            .await
    }

    pub async fn select_row_count(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        consistency: ReadConsistency,
    ) -> StoreResult<Option<u32>> {
        match self.kv.get(&meta_key(bucket, blob_id), consistency).await? {
            Some(raw) => decode_count(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Weak read of the part count, retried at strong consistency when absent.
    pub async fn select_row_count_with_fallback(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
    ) -> StoreResult<Option<u32>> {
        if let Some(count) = self
            .select_row_count(bucket, blob_id, ReadConsistency::Weak)
            .await?
        {
            return Ok(Some(count));
        }
        debug!(%bucket, %blob_id, "row count absent at weak consistency, retrying strong");
        self.select_row_count(bucket, blob_id, ReadConsistency::Strong)
            .await
    }

    /// Remove every part record of a blob. No-op when there are none.
    pub async fn delete_parts(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        self.delete_prefix(part_prefix(bucket, blob_id)).await
    }

    /// Remove the metadata record of a blob, making it unreadable.
    pub async fn delete_position(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        self.kv.delete(&meta_key(bucket, blob_id)).await
    }

    /// Remove every metadata and part record of a bucket.
    pub async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        self.delete_prefix(bucket_prefix(META_TAG, bucket)).await?;
        self.delete_prefix(bucket_prefix(PART_TAG, bucket)).await
    }

    /// Every committed `(bucket, blob id)` pair, fetched lazily page by page.
    pub fn list_all(&self) -> BoxStream<'static, StoreResult<(BucketName, BlobId)>> {
        scan_prefix(self.kv.clone(), vec![META_TAG, SEPARATOR], self.page_size)
            .and_then(|(key, _)| async move { parse_meta_key(&key) })
            .boxed()
    }

    /// Committed blob ids of one bucket, fetched lazily page by page.
    pub fn list_bucket(&self, bucket: &BucketName) -> BoxStream<'static, StoreResult<BlobId>> {
        scan_prefix(
            self.kv.clone(),
            bucket_prefix(META_TAG, bucket),
            self.page_size,
        )
        .and_then(|(key, _)| async move { parse_meta_key(&key).map(|(_, blob_id)| blob_id) })
        .boxed()
    }

    async fn delete_prefix(&self, prefix: Vec<u8>) -> StoreResult<()> {
        let kv = self.kv.clone();
        scan_prefix(self.kv.clone(), prefix, self.page_size)
            .try_for_each(|(key, _)| {
                let kv = kv.clone();
                async move { kv.delete(&key).await }
            })
            .await
    }
}

impl std::fmt::Debug for PartStoreDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartStoreDao")
            .field("page_size", &self.page_size)
            .finish()
    }
}

fn scan_prefix(
    kv: Arc<dyn KvClient>,
    prefix: Vec<u8>,
    page_size: usize,
) -> BoxStream<'static, StoreResult<(Vec<u8>, Bytes)>> {
    // State: `Some(cursor)` while pages remain, `None` once a short page ends the scan.
    stream::try_unfold(Some(None::<Vec<u8>>), move |state| {
        let kv = kv.clone();
        let prefix = prefix.clone();
        async move {
            let Some(start_after) = state else {
                return Ok(None);
            };
            let page = kv.scan(&prefix, start_after.as_deref(), page_size).await?;
            let next = match page.last() {
                Some((key, _)) if page.len() == page_size => Some(Some(key.clone())),
                _ => None,
            };
            let entries = stream::iter(page.into_iter().map(Ok::<_, StoreError>));
            Ok::<_, StoreError>(Some((entries, next)))
        }
    })
    .try_flatten()
    .boxed()
}

fn bucket_prefix(tag: u8, bucket: &BucketName) -> Vec<u8> {
    let mut key = Vec::with_capacity(bucket.as_str().len() + 3);
    key.push(tag);
    key.push(SEPARATOR);
    key.extend_from_slice(bucket.as_str().as_bytes());
    key.push(SEPARATOR);
    key
}

fn meta_key(bucket: &BucketName, blob_id: BlobId) -> Vec<u8> {
    let mut key = bucket_prefix(META_TAG, bucket);
    key.extend_from_slice(blob_id.to_string().as_bytes());
    key
}

fn part_prefix(bucket: &BucketName, blob_id: BlobId) -> Vec<u8> {
    let mut key = bucket_prefix(PART_TAG, bucket);
    key.extend_from_slice(blob_id.to_string().as_bytes());
    key.push(SEPARATOR);
    key
}

fn part_key(bucket: &BucketName, blob_id: BlobId, position: u32) -> Vec<u8> {
    let mut key = part_prefix(bucket, blob_id);
    key.extend_from_slice(&position.to_be_bytes());
    key
}

fn parse_meta_key(key: &[u8]) -> StoreResult<(BucketName, BlobId)> {
    let malformed = || StoreError::ObjectStore(format!("malformed metadata key {key:?}"));
    let rest = key
        .strip_prefix(&[META_TAG, SEPARATOR][..])
        .ok_or_else(malformed)?;
    let split = rest
        .iter()
        .position(|b| *b == SEPARATOR)
        .ok_or_else(malformed)?;
    let bucket = std::str::from_utf8(&rest[..split]).map_err(|_| malformed())?;
    let blob_id = std::str::from_utf8(&rest[split + 1..]).map_err(|_| malformed())?;
    Ok((BucketName::new(bucket)?, BlobId::parse(blob_id)?))
}

fn decode_count(raw: &[u8]) -> StoreResult<u32> {
    let bytes: [u8; 4] = raw.try_into().map_err(|_| {
        StoreError::ObjectStore(format!("part count record has {} bytes, expected 4", raw.len()))
    })?;
    Ok(u32::from_be_bytes(bytes))
}
