use std::path::{Path, PathBuf};

use mailblob_types::BucketName;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheConfiguration, DEFAULT_CACHE_SIZE_THRESHOLD};
use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::dedup::StorageStrategy;
use crate::error::{StoreError, StoreResult};
use crate::hybrid::{HybridConfiguration, DEFAULT_SIZE_THRESHOLD};

/// Blob store settings, usually read from a TOML file:
///
/// ```toml
/// default_bucket = "default-bucket"
/// deduplication = true
/// chunk_size = 102400
/// size_threshold = 32768
///
/// [storage]
/// kind = "hybrid"
/// low_cost = { kind = "file", root = "/var/lib/mailblob" }
/// high_performance = { kind = "chunked" }
///
/// [cache]
/// backend = { kind = "memory" }
/// size_threshold = 8192
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    #[serde(default)]
    pub default_bucket: BucketName,
    /// Content-derived ids when `true`, random ids otherwise. Has no default:
    /// switching it on an existing deployment changes how ids are produced.
    pub deduplication: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_size_threshold")]
    pub size_threshold: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Optional cache in front of the whole storage topology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_size_threshold() -> u64 {
    DEFAULT_SIZE_THRESHOLD
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            default_bucket: BucketName::default(),
            deduplication: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            storage: StorageConfig::default(),
            cache: None,
        }
    }
}

impl BlobStoreConfig {
    pub fn from_toml_str(raw: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| {
            StoreError::InconsistentConfiguration(format!("invalid blob store configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| StoreError::InconsistentConfiguration(e.to_string()))
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.chunk_size == 0 {
            return Err(StoreError::InconsistentConfiguration(
                "chunk_size must be strictly positive".into(),
            ));
        }
        Ok(())
    }

    pub fn strategy(&self) -> StorageStrategy {
        if self.deduplication {
            StorageStrategy::Deduplication
        } else {
            StorageStrategy::Passthrough
        }
    }

    pub fn hybrid_configuration(&self) -> HybridConfiguration {
        HybridConfiguration {
            size_threshold: self.size_threshold,
        }
    }
}

/// Cache for small blobs of the default bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: BackendConfig,
    #[serde(default = "default_cache_size_threshold")]
    pub size_threshold: u64,
}

fn default_cache_size_threshold() -> u64 {
    DEFAULT_CACHE_SIZE_THRESHOLD
}

impl CacheConfig {
    pub fn configuration(&self) -> CacheConfiguration {
        CacheConfiguration {
            size_threshold: self.size_threshold,
        }
    }
}

/// How backends are composed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Single {
        backend: BackendConfig,
    },
    Hybrid {
        low_cost: BackendConfig,
        high_performance: BackendConfig,
    },
    Union {
        current: BackendConfig,
        legacy: BackendConfig,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Single {
            backend: BackendConfig::Memory,
        }
    }
}

/// One storage backend. `kind` is matched case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", try_from = "RawBackendConfig")]
pub enum BackendConfig {
    /// Flat in-process map.
    Memory,
    /// Chunked parts on an in-process key-value store.
    Chunked,
    /// One file per blob under `root`.
    File { root: PathBuf },
}

#[derive(Deserialize)]
struct RawBackendConfig {
    kind: String,
    root: Option<PathBuf>,
}

impl TryFrom<RawBackendConfig> for BackendConfig {
    type Error = String;

    fn try_from(raw: RawBackendConfig) -> Result<Self, Self::Error> {
        match (raw.kind.to_ascii_lowercase().as_str(), raw.root) {
            ("memory", _) => Ok(Self::Memory),
            ("chunked", _) => Ok(Self::Chunked),
            ("file", Some(root)) => Ok(Self::File { root }),
            ("file", None) => Err("file backend requires a `root` directory".into()),
            (_, _) => Err(format!(
                "unknown blob store backend `{}`, expected memory, chunked or file",
                raw.kind
            )),
        }
    }
}
