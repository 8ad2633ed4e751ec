//! Blob storage engine for mail payloads.
//!
//! Blobs are opaque byte payloads grouped in buckets and addressed by a
//! [`BlobId`](mailblob_types::BlobId) the store chooses: derived from the
//! content (deduplication) or random (passthrough).
//!
//! # Layers
//!
//! - [`BlobStoreDao`] -- backends storing bytes under caller-supplied ids:
//!   [`MemoryBlobStoreDao`], [`ChunkedBlobStoreDao`] (fixed-size parts on a
//!   [`KvClient`] through the [`PartStoreDao`]), and [`FileBlobStoreDao`]
//! - [`BlobStore`] -- the caller contract. [`DeduplicatingBlobStore`] wraps one
//!   DAO; [`HybridBlobStore`] and [`UnionBlobStore`] compose two stores;
//!   [`CachedBlobStore`] keeps small default-bucket blobs in a cache DAO
//! - [`BlobStoreFactory`] -- builds any of the above from a [`BlobStoreConfig`]
//!
//! # Design Rules
//!
//! 1. A chunked blob is committed by its part-count record, written only after
//!    every part is acknowledged.
//! 2. A read never returns truncated data: a missing part is a
//!    [`StoreError::MissingPart`] fault.
//! 3. Weak-consistency misses are retried at strong consistency before any
//!    part is declared missing.
//! 4. Writes are never retried on another tier. Reads fall back.
//! 5. The default bucket can never be deleted.

pub mod cache;
pub mod chunk;
pub mod chunked;
pub mod config;
pub mod content;
pub mod dedup;
pub mod error;
pub mod factory;
mod fallback;
pub mod file;
pub mod hybrid;
pub mod kv;
pub mod memory;
pub mod parts;
pub mod traits;
pub mod union;

#[cfg(test)]
mod testing;

pub use cache::{CacheConfiguration, CachedBlobStore, DEFAULT_CACHE_SIZE_THRESHOLD};
pub use chunk::{ChunkCodec, DEFAULT_CHUNK_SIZE};
pub use chunked::ChunkedBlobStoreDao;
pub use config::{BackendConfig, BlobStoreConfig, CacheConfig, StorageConfig};
pub use content::{collect, BlobContent, BlobReader, BlobStream, Spool};
pub use dedup::{DeduplicatingBlobStore, StorageStrategy};
pub use error::{StoreError, StoreResult};
pub use factory::BlobStoreFactory;
pub use file::FileBlobStoreDao;
pub use hybrid::{HybridBlobStore, HybridConfiguration, DEFAULT_SIZE_THRESHOLD};
pub use kv::{KvClient, MemoryKvStore, ReadConsistency};
pub use memory::MemoryBlobStoreDao;
pub use parts::PartStoreDao;
pub use traits::{BlobStore, BlobStoreDao};
pub use union::UnionBlobStore;
