//! Byte-keyed raw storage: the bottom layer of the object/pack storage
//! engine.
//!
//! A [`RawStore`] maps an opaque string key to an opaque byte sequence. It
//! knows nothing about git object types, zlib envelopes, or pack framing —
//! those concerns live in `git-loose` and `git-pack`, which sit on top of
//! this crate. Four backends are provided: [`memory::InMemoryStore`],
//! [`file::FileStore`], [`chunked::ChunkedFileStore`], and [`kv::KvStore`].

pub mod chunked;
pub mod file;
pub mod kv;
pub mod memory;

pub use chunked::ChunkedFileStore;
pub use file::FileStore;
pub use kv::KvStore;
pub use memory::InMemoryStore;

/// Errors produced by raw store operations.
#[derive(Debug, thiserror::Error)]
pub enum RawStoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An optional read window: byte offset and length clipped to the value's
/// actual size. `length: None` means "to the end".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadWindow {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ReadWindow {
    pub const fn all() -> Self {
        Self { offset: 0, length: None }
    }

    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length: Some(length) }
    }

    /// Clip `self` against a value of `total_len` bytes, returning
    /// `(start, end)` indices valid for slicing. `offset == total_len`
    /// yields an empty, not-erroring, range.
    pub fn clamp(&self, total_len: u64) -> (u64, u64) {
        let start = self.offset.min(total_len);
        let end = match self.length {
            Some(len) => start.saturating_add(len).min(total_len),
            None => total_len,
        };
        (start, end)
    }
}

/// The byte-keyed raw store contract (spec §4.1).
///
/// Implementations guarantee: zero-length values are valid and retrievable;
/// reading past the end of a value yields empty bytes rather than an error;
/// `store` replaces any prior value for the same key atomically — a reader
/// never observes a partially written value.
pub trait RawStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing value. Returns the
    /// number of bytes stored.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<usize, RawStoreError>;

    /// Load the bytes stored under `key`, optionally clipped to `window`.
    /// Returns `Ok(None)` if the key does not exist.
    fn load(
        &self,
        key: &str,
        window: ReadWindow,
    ) -> Result<Option<Vec<u8>>, RawStoreError>;

    /// Whether `key` currently has a stored value.
    fn has(&self, key: &str) -> Result<bool, RawStoreError>;

    /// The size in bytes of the value stored under `key`, or `-1` if absent.
    fn size(&self, key: &str) -> Result<i64, RawStoreError>;

    /// Delete the value stored under `key`. Returns whether it was present.
    fn delete(&self, key: &str) -> Result<bool, RawStoreError>;

    /// Enumerate keys, optionally restricted to those starting with
    /// `prefix`. The enumeration is a snapshot or weakly consistent; it
    /// never yields a key twice.
    fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, RawStoreError>;

    /// Convenience: load the full value (no windowing).
    fn load_all(&self, key: &str) -> Result<Option<Vec<u8>>, RawStoreError> {
        self.load(key, ReadWindow::all())
    }
}
