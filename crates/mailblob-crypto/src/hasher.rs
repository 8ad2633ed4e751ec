use mailblob_types::BlobId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation, so ids produced by
/// different hashers never collide even for identical bytes.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob payloads.
    pub const BLOB: Self = Self {
        domain: "mailblob-blob-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash an in-memory payload.
    pub fn hash(&self, data: &[u8]) -> BlobId {
        let mut hasher = self.incremental();
        hasher.update(data);
        hasher.finalize()
    }

    /// Start an incremental hash, for payloads that arrive as a stream.
    pub fn incremental(&self) -> IncrementalHasher {
        let mut inner = blake3::Hasher::new();
        inner.update(self.domain.as_bytes());
        inner.update(b":");
        IncrementalHasher { inner, len: 0 }
    }

    /// Verify that data produces the expected id.
    pub fn verify(&self, data: &[u8], expected: &BlobId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Digest state fed chunk by chunk while bytes are forwarded elsewhere.
pub struct IncrementalHasher {
    inner: blake3::Hasher,
    len: u64,
}

impl IncrementalHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of payload bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn finalize(&self) -> BlobId {
        BlobId::from_hash(*self.inner.finalize().as_bytes())
    }
}
