//! The blob store engine.
//!
//! A [`Store`] packs many logical blobs, each identified by an opaque string
//! path, into one backing file. Records are only ever appended; an update
//! tombstones the old record and appends a replacement, and a delete just
//! flips the tombstone flag. Dead bytes accumulate until the configured
//! [`CompactionPolicy`] triggers a full rewrite of the log.
//!
//! # Concurrency
//!
//! One reader/writer lock governs the whole instance. `read`, `exists`,
//! `list` and `find` share the lock; `write`, `delete` and compaction hold
//! it exclusively. Operations are linearizable in lock-acquisition order,
//! and the tombstone flip plus replacement append inside a `write` are
//! observable only as a single step.
//!
//! Multiple `Store` instances over the same backing file are not supported.
//!
//! # Invariants
//!
//! - Every index entry points at a record whose tombstone flag is 0 and
//!   whose header declares the entry's size
//! - No two live records share a path: the old record is tombstoned before
//!   its replacement is appended
//! - The backing file is a strict concatenation of records from offset 0
//! - After compaction the file holds only live records and both tombstone
//!   counters are zero

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;

use crate::compaction::{CompactionPolicy, CompactionStats};
use crate::device::Device;
use crate::index::{IndexEntry, PathIndex};
use crate::record::{self, RecordHeader};
use crate::{StoreError, recovery};

/// Embedded single-file blob store.
///
/// Opening scans the backing file end to end to rebuild the in-memory
/// index, so all data committed before a crash is visible again; a torn
/// record at the tail is discarded.
#[derive(Debug)]
pub struct Store {
    pub(crate) inner: RwLock<StoreInner>,
}

/// Store state guarded by the instance lock.
#[derive(Debug)]
pub(crate) struct StoreInner {
    pub(crate) device: Device,
    pub(crate) index: PathIndex,
    policy: CompactionPolicy,
    pub(crate) deleted_count: u32,
    pub(crate) deleted_size: u64,
}

/// Live and tombstone tallies for one store instance.
///
/// Tombstone counters are rebuilt by the open-time scan and zeroed by a
/// successful compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live records.
    pub live_count: usize,
    /// Sum of live payload sizes in bytes.
    pub live_size: u64,
    /// Number of tombstoned records in the log.
    pub deleted_count: u32,
    /// Sum of tombstoned records' declared sizes in bytes.
    pub deleted_size: u64,
}

impl Store {
    /// Opens or creates a store at the given backing file path, with
    /// compaction disabled (the default policy).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open_with(path, CompactionPolicy::default())
    }

    /// Opens or creates a store with the given compaction policy.
    ///
    /// The backing file is scanned end to end to rebuild the index and the
    /// tombstone counters. If the scan finds a torn record at the tail, the
    /// file is truncated back to the last good record boundary.
    pub fn open_with(
        path: impl Into<PathBuf>,
        policy: CompactionPolicy,
    ) -> Result<Self, StoreError> {
        let device = Device::open(path)?;
        let report = recovery::scan(&device)?;
        if report.log_end < device.len()? {
            device.truncate(report.log_end)?;
        }

        Ok(Self {
            inner: RwLock::new(StoreInner {
                device,
                index: report.index,
                policy,
                deleted_count: report.deleted_count,
                deleted_size: report.deleted_size,
            }),
        })
    }

    /// Returns true if any stored path starts with `prefix`.
    ///
    /// This is prefix semantics, not exact match: with only `"a/b"` stored,
    /// `exists("a")` is true.
    pub fn exists(&self, prefix: &str) -> bool {
        self.read_lock().index.exists(prefix)
    }

    /// Returns all stored paths starting with `prefix`, sorted.
    ///
    /// An empty prefix lists every path.
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.read_lock().index.list(prefix)
    }

    /// Returns all stored paths ending with `name`, sorted.
    pub fn find(&self, name: &str) -> Vec<String> {
        self.read_lock().index.find(name)
    }

    /// Reads the payload of the blob at `path`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no live record exists for the path.
    pub fn read(&self, path: &str) -> Result<Bytes, StoreError> {
        let inner = self.read_lock();
        let entry = inner.lookup(path)?;
        inner.read_payload(entry)
    }

    /// Writes a blob at `path`.
    ///
    /// If the path is already live and `overwrite` is true, the existing
    /// record is tombstoned and the new payload appended in its place; with
    /// `overwrite` false the write fails and the prior value stays intact.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyExists`] if the path is live and `overwrite`
    ///   is false
    /// - [`StoreError::InvalidPath`] / [`StoreError::PayloadTooLarge`] if
    ///   path or payload exceed the record format's limits
    pub fn write(&self, path: &str, payload: &[u8], overwrite: bool) -> Result<(), StoreError> {
        self.write_lock().write_record(path, payload, overwrite)
    }

    /// Deletes the blob at `path` by tombstoning its record.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no live record exists for the path.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.write_lock().delete_record(path)
    }

    /// Rewrites the backing file to contain only live records, regardless
    /// of the configured policy.
    pub fn compact(&self) -> Result<(), StoreError> {
        self.write_lock().compact()
    }

    /// Syncs the backing file to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.read_lock().device.sync()
    }

    /// Returns the current live and tombstone tallies.
    pub fn stats(&self) -> StoreStats {
        let inner = self.read_lock();
        StoreStats {
            live_count: inner.index.len(),
            live_size: inner.index.live_size(),
            deleted_count: inner.deleted_count,
            deleted_size: inner.deleted_size,
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> PathBuf {
        self.read_lock().device.path().to_path_buf()
    }

    pub(crate) fn read_lock(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().expect("store lock poisoned")
    }

    pub(crate) fn write_lock(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().expect("store lock poisoned")
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut()
            && let Err(e) = inner.device.sync()
        {
            tracing::error!(error = %e, "failed to sync backing file during Store drop");
        }
    }
}

impl StoreInner {
    pub(crate) fn lookup(&self, path: &str) -> Result<IndexEntry, StoreError> {
        self.index.get(path).ok_or_else(|| StoreError::NotFound {
            path: path.to_string(),
        })
    }

    /// Reads a record's payload from the backing file.
    pub(crate) fn read_payload(&self, entry: IndexEntry) -> Result<Bytes, StoreError> {
        let mut buf = vec![0u8; entry.size as usize];
        self.device.read_exact_at(entry.payload_offset, &mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// The write protocol: tombstone any existing record for the path, then
    /// append the replacement and update the index.
    pub(crate) fn write_record(
        &mut self,
        path: &str,
        payload: &[u8],
        overwrite: bool,
    ) -> Result<(), StoreError> {
        // Validate path and payload limits before mutating anything.
        let header = RecordHeader::encode(path, payload.len())?;

        if !overwrite && self.index.get(path).is_some() {
            return Err(StoreError::AlreadyExists {
                path: path.to_string(),
            });
        }
        self.tombstone_existing(path)?;

        let mut buf = Vec::with_capacity(header.len() + payload.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(payload);
        let record_offset = self.device.append(&buf)?;

        self.index.insert(
            path.to_string(),
            IndexEntry {
                size: payload.len() as u32,
                payload_offset: record_offset + header.len() as u64,
            },
        );

        self.maybe_compact()
    }

    pub(crate) fn delete_record(&mut self, path: &str) -> Result<(), StoreError> {
        if self.tombstone_existing(path)?.is_none() {
            return Err(StoreError::NotFound {
                path: path.to_string(),
            });
        }
        self.maybe_compact()
    }

    /// Flips the tombstone flag of the live record for `path`, if any,
    /// removing it from the index and bumping the tombstone counters.
    pub(crate) fn tombstone_existing(
        &mut self,
        path: &str,
    ) -> Result<Option<IndexEntry>, StoreError> {
        let Some(entry) = self.index.get(path) else {
            return Ok(None);
        };
        self.device
            .write_all_at(record::tombstone_byte_offset(entry.payload_offset), &[1])?;
        self.index.remove(path);
        self.deleted_count += 1;
        self.deleted_size += u64::from(entry.size);
        Ok(Some(entry))
    }

    /// Compacts if the policy says the tombstone tallies warrant it.
    pub(crate) fn maybe_compact(&mut self) -> Result<(), StoreError> {
        if self.policy.should_compact(
            self.index.len() as u64,
            self.index.live_size(),
            self.deleted_count,
            self.deleted_size,
        ) {
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrites the log into a sibling file with only live records, then
    /// atomically swaps it in place of the backing file.
    ///
    /// Records are replayed in path order, so compacting an already-compact
    /// log reproduces it byte for byte.
    pub(crate) fn compact(&mut self) -> Result<(), StoreError> {
        let old_len = self.device.len()?;
        let mut sibling = Device::open(sibling_path(self.device.path()))?;
        // A crashed earlier compaction may have left bytes behind.
        sibling.truncate(0)?;

        let mut new_index = PathIndex::new();
        let mut write_offset: u64 = 0;
        for (path, entry) in self.index.entries_sorted() {
            let payload = self.read_payload(entry)?;
            let header = RecordHeader::encode(&path, payload.len())?;
            let mut buf = Vec::with_capacity(header.len() + payload.len());
            buf.extend_from_slice(&header);
            buf.extend_from_slice(&payload);
            sibling.write_all_at(write_offset, &buf)?;

            new_index.insert(
                path,
                IndexEntry {
                    size: entry.size,
                    payload_offset: write_offset + header.len() as u64,
                },
            );
            write_offset += buf.len() as u64;
        }
        sibling.sync()?;
        let target = self.device.path().to_path_buf();
        sibling.persist_as(&target)?;

        let stats = CompactionStats {
            records_kept: new_index.len(),
            bytes_reclaimed: old_len.saturating_sub(write_offset),
            tombstones_dropped: self.deleted_count,
        };
        self.device = sibling;
        self.index = new_index;
        self.deleted_count = 0;
        self.deleted_size = 0;

        tracing::info!(
            records_kept = stats.records_kept,
            bytes_reclaimed = stats.bytes_reclaimed,
            tombstones_dropped = stats.tombstones_dropped,
            "compacted log"
        );
        Ok(())
    }
}

/// Builds a unique sibling path next to the backing file for compaction to
/// write into.
fn sibling_path(path: &Path) -> PathBuf {
    let token: u32 = rand::random();
    let mut sibling = path.as_os_str().to_owned();
    sibling.push(format!(".{token:08x}.compact"));
    PathBuf::from(sibling)
}
