use std::sync::Arc;

use tracing::info;

use crate::cache::CachedBlobStore;
use crate::chunk::ChunkCodec;
use crate::chunked::ChunkedBlobStoreDao;
use crate::config::{BackendConfig, BlobStoreConfig, StorageConfig};
use crate::dedup::DeduplicatingBlobStore;
use crate::error::StoreResult;
use crate::file::FileBlobStoreDao;
use crate::hybrid::HybridBlobStore;
use crate::kv::MemoryKvStore;
use crate::memory::MemoryBlobStoreDao;
use crate::parts::PartStoreDao;
use crate::traits::{BlobStore, BlobStoreDao};
use crate::union::UnionBlobStore;

/// Wires DAOs, the deduplicating wrapper and tier compositions from a
/// [`BlobStoreConfig`].
pub struct BlobStoreFactory;

impl BlobStoreFactory {
    pub async fn build(config: &BlobStoreConfig) -> StoreResult<Arc<dyn BlobStore>> {
        config.validate()?;
        let store: Arc<dyn BlobStore> = match &config.storage {
            StorageConfig::Single { backend } => Self::single(config, backend).await?,
            StorageConfig::Hybrid {
                low_cost,
                high_performance,
            } => Arc::new(HybridBlobStore::new(
                Self::single(config, low_cost).await?,
                Self::single(config, high_performance).await?,
                config.hybrid_configuration(),
            )?),
            StorageConfig::Union { current, legacy } => Arc::new(UnionBlobStore::new(
                Self::single(config, current).await?,
                Self::single(config, legacy).await?,
            )?),
        };
        let store: Arc<dyn BlobStore> = match &config.cache {
            Some(cache) => Arc::new(CachedBlobStore::new(
                Self::build_dao(config, &cache.backend).await?,
                store,
                cache.configuration(),
            )),
            None => store,
        };
        info!(
            default_bucket = %config.default_bucket,
            strategy = ?config.strategy(),
            storage = ?config.storage,
            cached = config.cache.is_some(),
            "blob store built"
        );
        Ok(store)
    }

    /// Build the DAO for one backend. Every call returns an independent
    /// instance: two in-memory tiers never share state.
    pub async fn build_dao(
        config: &BlobStoreConfig,
        backend: &BackendConfig,
    ) -> StoreResult<Arc<dyn BlobStoreDao>> {
        Ok(match backend {
            BackendConfig::Memory => Arc::new(MemoryBlobStoreDao::new()),
            BackendConfig::Chunked => {
                let parts = PartStoreDao::new(Arc::new(MemoryKvStore::new()));
                Arc::new(ChunkedBlobStoreDao::new(
                    Arc::new(parts),
                    ChunkCodec::new(config.chunk_size)?,
                ))
            }
            BackendConfig::File { root } => Arc::new(FileBlobStoreDao::open(root).await?),
        })
    }

    async fn single(
        config: &BlobStoreConfig,
        backend: &BackendConfig,
    ) -> StoreResult<Arc<dyn BlobStore>> {
        let dao = Self::build_dao(config, backend).await?;
        Ok(Arc::new(DeduplicatingBlobStore::new(
            dao,
            config.default_bucket.clone(),
            config.strategy(),
        )))
    }
}
