use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mailblob_types::{BlobId, BucketName};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::ChunkCodec;
use crate::content::{BlobContent, BlobStream};
use crate::error::{StoreError, StoreResult};
use crate::traits::BlobStoreDao;

const TEMP_PREFIX: &str = ".tmp-";
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem-backed blob DAO, standing in for object storage.
///
/// Layout: `<root>/<bucket>/<blob-id>`. Blobs are written to a temporary
/// file inside the bucket directory and renamed into place, so a reader sees
/// either the previous blob or the complete new one.
#[derive(Debug, Clone)]
pub struct FileBlobStoreDao {
    root: PathBuf,
    read_codec: ChunkCodec,
}

impl FileBlobStoreDao {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let read_codec = ChunkCodec::new(READ_CHUNK_SIZE)?;
        Ok(Self { root, read_codec })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &BucketName) -> PathBuf {
        self.root.join(bucket.as_str())
    }

    fn blob_path(&self, bucket: &BucketName, blob_id: BlobId) -> PathBuf {
        self.bucket_dir(bucket).join(blob_id.to_string())
    }

    async fn write_temp(&self, temp_path: &Path, content: BlobContent) -> StoreResult<()> {
        let mut file = fs::File::create(temp_path).await?;
        match content {
            BlobContent::Bytes(bytes) => file.write_all(&bytes).await?,
            other => {
                let mut reader = other.into_reader().await?;
                tokio::io::copy(&mut reader, &mut file).await?;
            }
        }
        file.sync_all().await?;
        Ok(())
    }
}

fn ignore_missing(result: std::io::Result<()>) -> StoreResult<()> {
    match result {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl BlobStoreDao for FileBlobStoreDao {
    async fn save(
        &self,
        bucket: &BucketName,
        blob_id: BlobId,
        content: BlobContent,
    ) -> StoreResult<()> {
        let dir = self.bucket_dir(bucket);
        fs::create_dir_all(&dir).await?;

        let temp_path = dir.join(format!("{TEMP_PREFIX}{}", Uuid::now_v7()));
        if let Err(err) = self.write_temp(&temp_path, content).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(path = %temp_path.display(), error = %cleanup, "failed to remove temp file");
            }
            return Err(err);
        }
        fs::rename(&temp_path, self.blob_path(bucket, blob_id)).await?;
        debug!(%bucket, %blob_id, "file save");
        Ok(())
    }

    async fn read(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<BlobStream> {
        let file = match fs::File::open(self.blob_path(bucket, blob_id)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::not_found(bucket, blob_id));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(self.read_codec.split_reader(file))
    }

    async fn read_bytes(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<Bytes> {
        match fs::read(self.blob_path(bucket, blob_id)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::not_found(bucket, blob_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<bool> {
        Ok(fs::try_exists(self.blob_path(bucket, blob_id)).await?)
    }

    async fn delete(&self, bucket: &BucketName, blob_id: BlobId) -> StoreResult<()> {
        ignore_missing(fs::remove_file(self.blob_path(bucket, blob_id)).await)
    }

    async fn delete_bucket(&self, bucket: &BucketName) -> StoreResult<()> {
        ignore_missing(fs::remove_dir_all(self.bucket_dir(bucket)).await)
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketName>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                match BucketName::new(name) {
                    Ok(bucket) => names.push(bucket),
                    Err(err) => debug!(name, error = %err, "skipping foreign directory"),
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn list_blobs(&self, bucket: &BucketName) -> StoreResult<Vec<BlobId>> {
        let mut entries = match fs::read_dir(self.bucket_dir(bucket)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            // Only the canonical spelling maps back to a readable path.
            match BlobId::parse(name) {
                Ok(blob_id) if blob_id.to_string() == name => ids.push(blob_id),
                _ => {}
            }
        }
        ids.sort();
        Ok(ids)
    }
}
