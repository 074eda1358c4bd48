//! Error types for the blob store.

/// Errors surfaced by store operations.
///
/// Errors are never retried internally; every failure propagates to the
/// caller unchanged. A failed mutation either committed fully or did not
/// happen at all.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `read` or `delete` addressed a path with no live record.
    #[error("blob not found: {path}")]
    NotFound { path: String },

    /// `write` with `overwrite = false` addressed a path that is already live.
    #[error("blob already exists: {path}")]
    AlreadyExists { path: String },

    /// The path is not usable as a record key.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// The payload does not fit the record header's signed 32-bit size field.
    #[error("payload too large: {len} bytes (max {max})", max = i32::MAX)]
    PayloadTooLarge { len: usize },

    /// A record header could not be decoded at the given log offset.
    #[error("malformed record at offset {offset}: {reason}")]
    Malformed { offset: u64, reason: &'static str },

    /// The input ended in the middle of a record header.
    #[error("unexpected end of log")]
    UnexpectedEof,

    /// Compressing a payload failed.
    #[error("{codec} compression failed: {reason}")]
    CompressionFailed { codec: &'static str, reason: String },

    /// Decompressing a stored payload failed.
    #[error("{codec} decompression failed: {reason}")]
    DecompressionFailed { codec: &'static str, reason: String },

    /// Underlying OS I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
