use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use mailblob_types::{BlobId, BucketName};
use tracing::debug;

use crate::chunk::ChunkCodec;
use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::parts::PartStoreDao;
use crate::traits::BlobStoreDao;

/// Parts written concurrently by one save.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 4;
/// Parts fetched ahead of the consumer by one read.
pub const DEFAULT_READ_AHEAD: usize = 2;

/// Blob DAO that splits blobs into fixed-size parts on a [`PartStoreDao`].
///
/// Saves write every part, wait for all of them, then commit the part count.
/// Reads resolve the part count first (with consistency fallback) and stream
/// parts back in position order.
#[derive(Clone)]
pub struct ChunkedBlobStoreDao {
    parts: Arc<PartStoreDao>,
    codec: ChunkCodec,
    write_concurrency: usize,
    read_ahead: usize,
}

impl ChunkedBlobStoreDao {
    pub fn new(parts: Arc<PartStoreDao>, codec: ChunkCodec) -> Self {
        Self {
            parts,
            codec,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }

    pub fn part_store(&self) -> &Arc<PartStoreDao> {
        &self.parts
    }

    async fn part_count(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<u32> {
        self.parts
            .select_row_count_with_fallback(bucket, blob_id)
            .await?
            .ok_or_else(|| StoreError::not_found(bucket, blob_id))
    }
}

#[async_trait]
impl BlobStoreDao for ChunkedBlobStoreDao {
    async fn save(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        content: BlobContent,
    ) -> StoreResult<()> {
        let chunks = match content {
            BlobContent::Bytes(bytes) => {
                stream::iter(self.codec.split_bytes(bytes).into_iter().map(Ok)).boxed()
            }
            // Drain the source first so a failing stream never overwrites
            // the parts of an existing blob with the same id.
            other => {
                let spool = other.into_spool().await?;
                self.codec.split_reader(spool.into_reader().await?)
            }
        };

        let part_count = chunks
            .enumerate()
            .map(|(position, chunk)| {
                let parts = self.parts.clone();
                let bucket = bucket.clone();
                async move {
                    let position = u32::try_from(position).map_err(|_| {
                        StoreError::IllegalArgument(format!(
                            "blob {blob_id} exceeds {} parts",
                            u32::MAX
                        ))
                    })?;
                    parts.write_part(&bucket, blob_id, position, chunk?).await
                }
            })
            .buffer_unordered(self.write_concurrency)
            .try_fold(0u32, |count, ()| async move { Ok(count + 1) })
            .await?;

        self.parts
            .save_blob_parts_references(bucket, blob_id, part_count)
            .await?;
        debug!(%bucket, %blob_id, part_count, "chunked save");
        Ok(())
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        let part_count = self.part_count(bucket, blob_id).await?;
        debug!(%bucket, %blob_id, part_count, "chunked read");
        let parts = self.parts.clone();
        let bucket = bucket.clone();
        Ok(stream::iter(0..part_count)
            .map(move |position| {
                let parts = parts.clone();
                let bucket = bucket.clone();
                async move {
                    let part = parts
                        .read_part_with_fallback(&bucket, blob_id, position)
                        .await?;
                    part.ok_or(StoreError::MissingPart {
                        bucket,
                        blob_id,
                        position,
                    })
                }
            })
            .buffered(self.read_ahead)
            .boxed())
    }

    async fn exists(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<bool> {
        Ok(self
            .parts
            .select_row_count_with_fallback(bucket, blob_id)
            .await?
            .is_some())
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        // Uncommit first so no reader starts on a half-deleted blob.
        self.parts.delete_position(bucket, blob_id).await?;
        self.parts.delete_parts(bucket, blob_id).await
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        self.parts.delete_bucket(bucket).await
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketName>> {
        let mut names: Vec<BucketName> = self
            .parts
            .list_all()
            .map_ok(|(bucket, _)| bucket)
            .try_collect()
            .await?;
        names.dedup();
        Ok(names)
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        self.parts.list_bucket(bucket).try_collect().await
    }
}

impl std::fmt::Debug for ChunkedBlobStoreDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedBlobStoreDao")
            .field("chunk_size", &self.codec.chunk_size())
            .field("write_concurrency", &self.write_concurrency)
            .field("read_ahead", &self.read_ahead)
            .finish()
    }
}
