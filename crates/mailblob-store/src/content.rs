use std::io::Cursor;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use mailblob_crypto::ContentHasher;
use mailblob_types::BlobId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::StoreResult;

/// Boxed async byte source handed to the store.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Blob bytes as they come back from a read, in order.
pub type BlobStream = BoxStream<'static, StoreResult<Bytes>>;

/// Streams at or below this size are spooled in memory, larger ones spill to
/// a temporary file.
pub const SPOOL_MEMORY_THRESHOLD: usize = 100 * 1024;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Payload submitted to a save.
pub enum BlobContent {
    Bytes(Bytes),
    Stream(BlobReader),
    /// A stream already drained into a [`Spool`]: length and digest are known.
    Spooled(Spool),
}

impl BlobContent {
    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self::Stream(Box::pin(reader))
    }

    /// Payload length, when known without consuming a stream.
    pub fn len_if_known(&self) -> Option<u64> {
        match self {
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::Stream(_) => None,
            Self::Spooled(spool) => Some(spool.len()),
        }
    }

    /// Drain the payload into a spool, hashing it on the way.
    pub async fn into_spool(self) -> StoreResult<Spool> {
        match self {
            Self::Bytes(bytes) => Ok(Spool::from_bytes(bytes)),
            Self::Stream(reader) => Spool::from_reader(reader, SPOOL_MEMORY_THRESHOLD).await,
            Self::Spooled(spool) => Ok(spool),
        }
    }

    /// Turn the payload into a reader, whatever its shape.
    pub async fn into_reader(self) -> StoreResult<BlobReader> {
        match self {
            Self::Bytes(bytes) => Ok(Box::pin(Cursor::new(bytes))),
            Self::Stream(reader) => Ok(reader),
            Self::Spooled(spool) => spool.into_reader().await,
        }
    }

    /// Read the whole payload into memory.
    pub async fn into_bytes(self) -> StoreResult<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            Self::Spooled(spool) => spool.into_bytes().await,
        }
    }
}

impl std::fmt::Debug for BlobContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "BlobContent::Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => write!(f, "BlobContent::Stream"),
            Self::Spooled(spool) => write!(f, "BlobContent::Spooled({} bytes)", spool.len()),
        }
    }
}

impl From<Bytes> for BlobContent {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlobContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for BlobContent {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for BlobContent {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&str> for BlobContent {
    fn from(text: &str) -> Self {
        Self::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<BlobReader> for BlobContent {
    fn from(reader: BlobReader) -> Self {
        Self::Stream(reader)
    }
}

impl From<Spool> for BlobContent {
    fn from(spool: Spool) -> Self {
        Self::Spooled(spool)
    }
}

/// Collect a read stream into one contiguous buffer.
pub async fn collect(stream: BlobStream) -> StoreResult<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}

/// A fully drained source stream, kept in memory or in an anonymous
/// temporary file, together with its length and content digest.
///
/// Draining before writing means a source that fails half way never
/// reaches storage, and the content id is known before the first write.
pub struct Spool {
    storage: SpoolStorage,
    len: u64,
    content_id: BlobId,
}

enum SpoolStorage {
    Memory(Bytes),
    File(tokio::fs::File),
}

impl Spool {
    pub fn from_bytes(bytes: Bytes) -> Self {
        let content_id = ContentHasher::BLOB.hash(&bytes);
        Self {
            len: bytes.len() as u64,
            storage: SpoolStorage::Memory(bytes),
            content_id,
        }
    }

    /// Drain `reader`, spilling to a temporary file past `memory_threshold`.
    pub async fn from_reader(
        mut reader: impl AsyncRead + Unpin,
        memory_threshold: usize,
    ) -> StoreResult<Self> {
        let mut hasher = ContentHasher::BLOB.incremental();
        let mut memory = Vec::new();
        let mut file: Option<tokio::fs::File> = None;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let chunk = &buf[..n];
            hasher.update(chunk);
            match file.as_mut() {
                Some(file) => file.write_all(chunk).await?,
                None if memory.len() + n <= memory_threshold => memory.extend_from_slice(chunk),
                None => {
                    let mut spill = tokio::fs::File::from_std(tempfile::tempfile()?);
                    spill.write_all(&memory).await?;
                    spill.write_all(chunk).await?;
                    memory = Vec::new();
                    file = Some(spill);
                }
            }
        }

        let storage = match file {
            Some(mut file) => {
                file.flush().await?;
                SpoolStorage::File(file)
            }
            None => SpoolStorage::Memory(Bytes::from(memory)),
        };
        Ok(Self {
            storage,
            len: hasher.len(),
            content_id: hasher.finalize(),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Content-derived id of the spooled bytes.
    pub fn content_id(&self) -> BlobId {
        self.content_id
    }

    /// Returns `true` if the spool spilled to a temporary file.
    pub fn is_file_backed(&self) -> bool {
        matches!(self.storage, SpoolStorage::File(_))
    }

    pub async fn into_reader(self) -> StoreResult<BlobReader> {
        match self.storage {
            SpoolStorage::Memory(bytes) => Ok(Box::pin(Cursor::new(bytes))),
            SpoolStorage::File(mut file) => {
                file.rewind().await?;
                Ok(Box::pin(file))
            }
        }
    }

    pub async fn into_bytes(self) -> StoreResult<Bytes> {
        match self.storage {
            SpoolStorage::Memory(bytes) => Ok(bytes),
            SpoolStorage::File(mut file) => {
                file.rewind().await?;
                let mut buf = Vec::with_capacity(self.len as usize);
                file.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}
