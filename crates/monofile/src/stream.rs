//! Streaming views over single records.
//!
//! [`BlobReader`] exposes one record's payload window as an incremental
//! [`std::io::Read`]; [`BlobWriter`] streams a payload into a reserved
//! record span and writes the header once the true size is known. Both are
//! thin views over the payload offset and size the store already tracks.
//!
//! Lock retention is part of the contract: a reader holds the store's
//! shared lock and a writer holds the exclusive lock for their entire
//! lifetime, so no other operation can move or tombstone the record
//! underneath them. Drop releases the lock on every path.

use std::io::{self, Read, Write};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::StoreError;
use crate::index::IndexEntry;
use crate::record::{self, RecordHeader};
use crate::store::{Store, StoreInner};

impl Store {
    /// Opens an incremental reader over the payload of the blob at `path`.
    ///
    /// The reader holds the store's shared lock until dropped; writes and
    /// deletes block for that long.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no live record exists for the path.
    pub fn reader(&self, path: &str) -> Result<BlobReader<'_>, StoreError> {
        let guard = self.read_lock();
        let entry = guard.lookup(path)?;
        Ok(BlobReader {
            guard,
            payload_offset: entry.payload_offset,
            size: entry.size,
            pos: 0,
        })
    }

    /// Opens an incremental writer for a blob at `path`.
    ///
    /// The record span is reserved at the end of the log, but nothing is
    /// committed yet: payload bytes stream into the span past a
    /// header-sized gap, and only [`BlobWriter::finish`] (or drop) writes
    /// the header with the true size, tombstones any record the stream
    /// replaces and publishes the index entry. Until then the reservation
    /// is invisible to recovery, so a crash mid-stream leaves the path
    /// exactly as it was.
    ///
    /// The writer holds the store's exclusive lock until dropped.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if the path is live and `overwrite`
    ///   is false
    /// - [`StoreError::InvalidPath`] if the path is empty or too long
    pub fn writer(&self, path: &str, overwrite: bool) -> Result<BlobWriter<'_>, StoreError> {
        let guard = self.write_lock();
        record::validate_path(path)?;

        if !overwrite && guard.index.get(path).is_some() {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        let record_offset = guard.device.len()?;

        Ok(BlobWriter {
            guard,
            path: path.to_string(),
            record_offset,
            payload_offset: record_offset + RecordHeader::encoded_len(path),
            written: 0,
            finished: false,
        })
    }
}

/// Incremental reader over one record's payload.
#[derive(Debug)]
pub struct BlobReader<'a> {
    guard: RwLockReadGuard<'a, StoreInner>,
    payload_offset: u64,
    size: u32,
    pos: u32,
}

impl BlobReader<'_> {
    /// Returns the payload size in bytes.
    pub fn len(&self) -> u64 {
        u64::from(self.size)
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Read for BlobReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = (self.size - self.pos) as usize;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(remaining);
        self.guard
            .device
            .read_exact_at(self.payload_offset + u64::from(self.pos), &mut buf[..n])
            .map_err(io::Error::other)?;
        self.pos += n as u32;
        Ok(n)
    }
}

/// Incremental writer into one reserved record span.
///
/// The header region of the span stays unwritten while payload bytes
/// stream in; an unwritten region reads back as zeros, which never decodes
/// as a record, so an abandoned reservation is dropped by the next
/// recovery scan rather than surfacing as a blob.
///
/// Dropping the writer commits the bytes written so far; failures during a
/// drop-time commit are logged rather than surfaced. Call
/// [`BlobWriter::finish`] to observe them.
#[derive(Debug)]
pub struct BlobWriter<'a> {
    guard: RwLockWriteGuard<'a, StoreInner>,
    path: String,
    record_offset: u64,
    payload_offset: u64,
    written: u32,
    finished: bool,
}

impl BlobWriter<'_> {
    /// Returns the number of payload bytes written so far.
    pub fn written(&self) -> u64 {
        u64::from(self.written)
    }

    /// Completes the record: tombstones any record this stream replaces,
    /// writes the header with the true payload size, publishes the index
    /// entry and runs the compaction check, then releases the exclusive
    /// lock.
    pub fn finish(mut self) -> Result<(), StoreError> {
        self.commit()
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        // The old record stays live until the replacement is ready to be
        // published, so an interrupted stream never loses it.
        self.guard.tombstone_existing(&self.path)?;

        let header = RecordHeader::encode(&self.path, self.written as usize)?;
        self.guard
            .device
            .write_all_at(self.record_offset, &header)?;
        self.guard.index.insert(
            self.path.clone(),
            IndexEntry {
                size: self.written,
                payload_offset: self.payload_offset,
            },
        );
        self.guard.maybe_compact()
    }
}

impl Write for BlobWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if u64::from(self.written) + buf.len() as u64 > i32::MAX as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds the record size limit",
            ));
        }
        self.guard
            .device
            .write_all_at(self.payload_offset + u64::from(self.written), buf)
            .map_err(io::Error::other)?;
        self.written += buf.len() as u32;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BlobWriter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            tracing::error!(path = %self.path, error = %e, "failed to commit streamed blob during drop");
        }
    }
}
