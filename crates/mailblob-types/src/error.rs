use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid blob id: {0:?}")]
    InvalidBlobId(String),

    #[error("invalid bucket name {name:?}: {reason}")]
    InvalidBucketName { name: String, reason: &'static str },

    #[error("unknown storage policy: {0:?}")]
    UnknownStoragePolicy(String),
}
