use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;

/// Identifier of a stored blob.
///
/// A `BlobId` is either derived from the blob's content (a 32-byte digest,
/// so identical content always yields the identical id) or assigned by the
/// backend with no relation to the content. Both variants share one textual
/// form: 64 hex characters for digests, a hyphenated UUID for assigned ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlobId {
    /// Content-derived identifier.
    Hash([u8; 32]),
    /// Backend-assigned identifier.
    Assigned(Uuid),
}

impl BlobId {
    /// Create a content-derived id from a pre-computed digest.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self::Hash(hash)
    }

    /// Generate a fresh assigned id. UUID v7 keeps ids roughly time-ordered.
    pub fn random() -> Self {
        Self::Assigned(Uuid::now_v7())
    }

    /// Returns `true` if this id was derived from blob content.
    pub fn is_content_addressed(&self) -> bool {
        matches!(self, Self::Hash(_))
    }

    /// The digest behind a content-derived id.
    pub fn as_hash(&self) -> Option<&[u8; 32]> {
        match self {
            Self::Hash(hash) => Some(hash),
            Self::Assigned(_) => None,
        }
    }

    /// Short representation (first 8 characters).
    pub fn short(&self) -> String {
        match self {
            Self::Hash(hash) => hex::encode(&hash[..4]),
            Self::Assigned(uuid) => uuid.simple().to_string()[..8].to_string(),
        }
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.len() == 64 {
            let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            return Ok(Self::Hash(arr));
        }
        Uuid::parse_str(s)
            .map(Self::Assigned)
            .map_err(|_| TypeError::InvalidBlobId(s.to_string()))
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(_) => write!(f, "BlobId::Hash({})", self.short()),
            Self::Assigned(uuid) => write!(f, "BlobId::Assigned({uuid})"),
        }
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{}", hex::encode(hash)),
            Self::Assigned(uuid) => write!(f, "{}", uuid.hyphenated()),
        }
    }
}

impl FromStr for BlobId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for BlobId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.to_string()
    }
}

impl From<[u8; 32]> for BlobId {
    fn from(bytes: [u8; 32]) -> Self {
        Self::Hash(bytes)
    }
}
