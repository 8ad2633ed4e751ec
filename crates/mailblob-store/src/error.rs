use mailblob_types::{BlobId, BucketName, TypeError};

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No committed blob exists under this id.
    #[error("object not found: blob {blob_id} in bucket {bucket}")]
    NotFound { bucket: BucketName, blob_id: BlobId },

    /// The blob is committed but one of its parts could not be retrieved,
    /// even after a strong-consistency retry.
    #[error("Missing blob part for blobId {blob_id} at position {position} in bucket {bucket}")]
    MissingPart {
        bucket: BucketName,
        blob_id: BlobId,
        position: u32,
    },

    /// Stored data is malformed or inconsistent.
    #[error("object store fault: {0}")]
    ObjectStore(String),

    /// I/O error from a source stream or the local filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fault reported by the underlying backend client.
    #[error("backend fault: {0}")]
    Backend(String),

    /// Usage error, e.g. deleting the default bucket.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Stores or settings that cannot work together.
    #[error("inconsistent configuration: {0}")]
    InconsistentConfiguration(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl StoreError {
    pub fn not_found(bucket: &BucketName, blob_id: BlobId) -> Self {
        Self::NotFound {
            bucket: bucket.clone(),
            blob_id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Storage-side failures: anything that is neither "not found" nor a
    /// caller or configuration mistake.
    pub fn is_object_store_fault(&self) -> bool {
        matches!(
            self,
            Self::MissingPart { .. } | Self::ObjectStore(_) | Self::Io(_) | Self::Backend(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
