//! Foundation types for the mailblob storage engine.
//!
//! Every other mailblob crate depends on `mailblob-types`.
//!
//! # Key Types
//!
//! - [`BlobId`] -- content-derived or backend-assigned blob identifier
//! - [`BucketName`] -- validated namespace, with a distinguished default
//! - [`StoragePolicy`] -- write-routing hint resolved into a [`StorageTier`]

pub mod blob_id;
pub mod bucket;
pub mod error;
pub mod policy;

pub use blob_id::BlobId;
pub use bucket::{BucketName, DEFAULT_BUCKET};
pub use error::TypeError;
pub use policy::{StoragePolicy, StorageTier};
