//! Transparent payload compression.
//!
//! [`CompressedStore`] wraps an inner [`Store`] and presents the same
//! operation set, compressing payloads on the way in and decompressing on
//! the way out. Paths, listing, deletion and compaction behavior are
//! untouched; only the payload bytes are transformed.

use bytes::Bytes;

use crate::store::{Store, StoreStats};
use crate::{CompactionPolicy, StoreError};

/// Payload compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Store payloads as-is.
    None,
    /// LZ4 with a length-prepended frame (`lz4_flex`, pure Rust, fast).
    Lz4,
    /// Zstandard at the given compression level.
    Zstd {
        /// Compression level (1-22; 3 is the usual default).
        level: i32,
    },
}

impl Compression {
    /// Zstandard at its default level.
    pub fn zstd() -> Self {
        Self::Zstd { level: 3 }
    }

    fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd { .. } => "zstd",
        }
    }

    /// Compresses a payload.
    pub fn compress(self, input: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::None => Ok(input.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(input)),
            Self::Zstd { level } => {
                zstd::encode_all(input, level).map_err(|e| StoreError::CompressionFailed {
                    codec: self.name(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Decompresses a previously compressed payload.
    pub fn decompress(self, input: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self {
            Self::None => Ok(input.to_vec()),
            Self::Lz4 => lz4_flex::decompress_size_prepended(input).map_err(|e| {
                StoreError::DecompressionFailed {
                    codec: self.name(),
                    reason: e.to_string(),
                }
            }),
            Self::Zstd { .. } => {
                zstd::decode_all(input).map_err(|e| StoreError::DecompressionFailed {
                    codec: self.name(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// A [`Store`] that compresses payloads transparently.
///
/// Every operation delegates to the wrapped store; `write` compresses the
/// payload first and `read` decompresses the stored bytes. Sizes reported
/// by [`CompressedStore::stats`] are on-disk (compressed) sizes, as are the
/// sizes the compaction policy sees.
#[derive(Debug)]
pub struct CompressedStore {
    store: Store,
    compression: Compression,
}

impl CompressedStore {
    /// Wraps an open store.
    pub fn new(store: Store, compression: Compression) -> Self {
        Self { store, compression }
    }

    /// Opens or creates a compressed store at the given backing file path.
    pub fn open_with(
        path: impl Into<std::path::PathBuf>,
        policy: CompactionPolicy,
        compression: Compression,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(Store::open_with(path, policy)?, compression))
    }

    /// Returns the wrapped store, discarding the compression layer.
    ///
    /// Payloads written through this decorator remain compressed on disk.
    pub fn into_inner(self) -> Store {
        self.store
    }

    /// Returns true if any stored path starts with `prefix`.
    pub fn exists(&self, prefix: &str) -> bool {
        self.store.exists(prefix)
    }

    /// Returns all stored paths starting with `prefix`, sorted.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.store.list(prefix)
    }

    /// Returns all stored paths ending with `name`, sorted.
    pub fn find(&self, name: &str) -> Vec<String> {
        self.store.find(name)
    }

    /// Reads and decompresses the blob at `path`.
    pub fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        let stored = self.store.read(path)?;
        Ok(Bytes::from(self.compression.decompress(&stored)?))
    }

    /// Compresses and writes a blob at `path`.
    pub fn write(&self, path: &str, payload: &[u8], overwrite: bool) -> Result<(), StoreError> {
        let compressed = self.compression.compress(payload)?;
        self.store.write(path, &compressed, overwrite)
    }

    /// Deletes the blob at `path`.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.store.delete(path)
    }

    /// Compacts the wrapped store's log.
    pub fn compact(&self) -> Result<(), StoreError> {
        self.store.compact()
    }

    /// Syncs the backing file to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.store.sync()
    }

    /// Returns the wrapped store's tallies (on-disk sizes).
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }
}
