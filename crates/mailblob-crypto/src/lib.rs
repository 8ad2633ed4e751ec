//! Content hashing for the mailblob storage engine.
//!
//! Provides domain-separated BLAKE3 hashing from an in-memory payload or
//! incrementally from a stream. Hashing wraps the `blake3` crate; there is no
//! custom cryptography here.

pub mod hasher;

pub use hasher::{ContentHasher, IncrementalHasher};
