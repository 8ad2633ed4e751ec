use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Caller hint attached to a save. Only affects write routing in tiered
/// compositions; it is never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoragePolicy {
    LowCost,
    HighPerformance,
    /// High performance below the size threshold, low cost at or above it.
    SizeBased,
}

/// Concrete tier a save is routed to once the policy is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageTier {
    LowCost,
    HighPerformance,
}

impl StoragePolicy {
    /// Resolve the target tier for a payload of `size` bytes.
    pub fn resolve(self, size: u64, threshold: u64) -> StorageTier {
        match self {
            Self::LowCost => StorageTier::LowCost,
            Self::HighPerformance => StorageTier::HighPerformance,
            Self::SizeBased if size >= threshold => StorageTier::LowCost,
            Self::SizeBased => StorageTier::HighPerformance,
        }
    }
}

impl fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowCost => write!(f, "low-cost"),
            Self::HighPerformance => write!(f, "high-performance"),
            Self::SizeBased => write!(f, "size-based"),
        }
    }
}

impl FromStr for StoragePolicy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "low-cost" => Ok(Self::LowCost),
            "high-performance" => Ok(Self::HighPerformance),
            "size-based" => Ok(Self::SizeBased),
            _ => Err(TypeError::UnknownStoragePolicy(s.to_string())),
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowCost => write!(f, "low-cost"),
            Self::HighPerformance => write!(f, "high-performance"),
        }
    }
}
