use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Name of the bucket every store falls back to when callers do not pick one.
pub const DEFAULT_BUCKET: &str = "default-bucket";

const MAX_LEN: usize = 255;

/// Namespace partitioning the blobs of a store.
///
/// Names are restricted to `[A-Za-z0-9._-]` so they can be used verbatim as
/// directory names and as key-space components.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Validate and wrap a bucket name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidBucketName {
                name,
                reason: "must not be empty",
            });
        }
        if name.len() > MAX_LEN {
            return Err(TypeError::InvalidBucketName {
                name,
                reason: "must be at most 255 characters",
            });
        }
        if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return Err(TypeError::InvalidBucketName {
                name,
                reason: "only ASCII letters, digits, '.', '_' and '-' are allowed",
            });
        }
        if name == "." || name == ".." {
            return Err(TypeError::InvalidBucketName {
                name,
                reason: "reserved name",
            });
        }
        Ok(Self(name))
    }

    /// The conventional default bucket.
    pub fn default_bucket() -> Self {
        Self(DEFAULT_BUCKET.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BucketName {
    fn default() -> Self {
        Self::default_bucket()
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({})", self.0)
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BucketName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BucketName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BucketName> for String {
    fn from(bucket: BucketName) -> Self {
        bucket.0
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bucket_name() {
        assert_eq!(BucketName::default().as_str(), DEFAULT_BUCKET);
        assert_eq!(BucketName::default_bucket(), BucketName::new(DEFAULT_BUCKET).unwrap());
    }

    #[test]
    fn accepts_common_names() {
        for name in ["mailbox", "user-42", "attachments_2024", "a.b"] {
            assert!(BucketName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            BucketName::new(""),
            Err(TypeError::InvalidBucketName { .. })
        ));
    }

    #[test]
    fn rejects_path_separators_and_nul() {
        assert!(BucketName::new("a/b").is_err());
        assert!(BucketName::new("a\0b").is_err());
        assert!(BucketName::new("..").is_err());
    }

    #[test]
    fn rejects_overlong() {
        assert!(BucketName::new("x".repeat(256)).is_err());
        assert!(BucketName::new("x".repeat(255)).is_ok());
    }

    #[test]
    fn serde_validates() {
        let parsed: BucketName = serde_json::from_str("\"inbox\"").unwrap();
        assert_eq!(parsed.as_str(), "inbox");
        assert!(serde_json::from_str::<BucketName>("\"bad/name\"").is_err());
    }
}
