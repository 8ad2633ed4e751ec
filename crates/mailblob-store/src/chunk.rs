use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{StoreError, StoreResult};

/// Default size of one stored part: 100 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 100 * 1024;

/// Splits payloads into fixed-size parts and joins them back.
///
/// Every part but the last is exactly `chunk_size` bytes. An empty payload
/// has zero parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkCodec {
    chunk_size: usize,
}

impl ChunkCodec {
    pub fn new(chunk_size: usize) -> StoreResult<Self> {
        if chunk_size == 0 {
            return Err(StoreError::IllegalArgument(
                "chunk size must be strictly positive".into(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of parts a payload of `len` bytes splits into.
    pub fn part_count(&self, len: u64) -> u64 {
        len.div_ceil(self.chunk_size as u64)
    }

    /// Split an in-memory payload. Parts share the input buffer.
    pub fn split_bytes(&self, data: Bytes) -> Vec<Bytes> {
        let mut parts = Vec::with_capacity(self.part_count(data.len() as u64) as usize);
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.chunk_size).min(data.len());
            parts.push(data.slice(offset..end));
            offset = end;
        }
        parts
    }

    /// Split a reader lazily. Each yielded part is filled completely before
    /// it is emitted, regardless of how the reader fragments its output.
    pub fn split_reader<R>(&self, reader: R) -> BoxStream<'static, StoreResult<Bytes>>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let chunk_size = self.chunk_size;
        stream::try_unfold(Some(reader), move |state| async move {
            let Some(mut reader) = state else {
                return Ok(None);
            };
            let mut buf = BytesMut::with_capacity(chunk_size);
            while buf.len() < chunk_size {
                let n = (&mut reader)
                    .take((chunk_size - buf.len()) as u64)
                    .read_buf(&mut buf)
                    .await?;
                if n == 0 {
                    break;
                }
            }
            if buf.is_empty() {
                return Ok(None);
            }
            let next = (buf.len() == chunk_size).then_some(reader);
            Ok::<_, StoreError>(Some((buf.freeze(), next)))
        })
        .boxed()
    }

}

impl Default for ChunkCodec {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
