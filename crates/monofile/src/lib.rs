//! # monofile: embedded single-file blob store
//!
//! Monofile packs many logical blobs, each identified by an opaque string
//! path, into one backing file on the host filesystem. It is meant for
//! applications that prefer a single self-contained data file over many
//! host-filesystem entries: portable caches, packaged artifact bundles,
//! content archives.
//!
//! The backing file is an append-only log of records. A record is a small
//! big-endian header (path, payload size, tombstone flag) followed by the
//! raw payload. Updates tombstone the old record and append a replacement;
//! deletes only flip the tombstone flag. Dead bytes are reclaimed by
//! compaction, which rewrites the log with live records only and atomically
//! swaps it in. Opening a store scans the file end to end to rebuild the
//! in-memory path index, so the live set survives process restarts.
//!
//! # Example
//!
//! ```no_run
//! use monofile::Store;
//!
//! # fn main() -> Result<(), monofile::StoreError> {
//! let store = Store::open("bundle.mono")?;
//! store.write("assets/logo.png", b"\x89PNG...", true)?;
//! assert!(store.exists("assets/"));
//! let logo = store.read("assets/logo.png")?;
//! # let _ = logo;
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! A single reader/writer lock governs each store instance: any number of
//! readers in parallel, writers exclusive. The streaming adapters in
//! [`BlobReader`] and [`BlobWriter`] hold that lock for their lifetime.
//! Multiple instances over the same backing file are not supported.

mod codec;
mod compaction;
mod device;
mod error;
mod index;
mod record;
mod recovery;
mod store;
mod stream;

pub use codec::{CompressedStore, Compression};
pub use compaction::{CompactionPolicy, CompactionStrategy};
pub use error::StoreError;
pub use record::{MAX_PATH_LEN, RecordHeader};
pub use store::{Store, StoreStats};
pub use stream::{BlobReader, BlobWriter};
