//! Open-time recovery scan.
//!
//! On open, the backing file is walked from offset 0 to the end. Every
//! decodable record either lands in the index (live) or bumps the tombstone
//! counters (deleted). Recovery proceeds in append order, so a later live
//! record for a path naturally replaces an earlier one; the earlier record
//! becomes orphaned garbage that only compaction reclaims.
//!
//! An undecodable or truncated record marks a torn tail: the scan stops at
//! the last good record boundary without failing the open, and the caller
//! truncates the file to that boundary so the log stays a strict
//! concatenation of records.

use crate::StoreError;
use crate::device::Device;
use crate::index::{IndexEntry, PathIndex};
use crate::record::RecordHeader;

/// Outcome of scanning the backing file.
#[derive(Debug)]
pub(crate) struct ScanReport {
    /// Index of live records.
    pub index: PathIndex,
    /// Number of tombstoned records encountered.
    pub deleted_count: u32,
    /// Sum of tombstoned records' declared payload sizes.
    pub deleted_size: u64,
    /// Offset one past the last complete record; anything beyond is a torn
    /// tail.
    pub log_end: u64,
}

/// Walks the whole backing file and rebuilds the live-set view.
///
/// # Errors
///
/// Only I/O failures fail the scan. Malformed or truncated records stop it
/// at the last good boundary instead.
pub(crate) fn scan(device: &Device) -> Result<ScanReport, StoreError> {
    let data = device.read_all()?;

    let mut index = PathIndex::new();
    let mut deleted_count: u32 = 0;
    let mut deleted_size: u64 = 0;
    let mut offset: usize = 0;

    while offset < data.len() {
        let (header, header_len) = match RecordHeader::decode(&data[offset..], offset as u64) {
            Ok(decoded) => decoded,
            Err(StoreError::UnexpectedEof | StoreError::Malformed { .. }) => {
                tracing::warn!(
                    offset,
                    file_len = data.len(),
                    "torn record at log tail, stopping recovery scan"
                );
                break;
            }
            Err(e) => return Err(e),
        };

        let payload_offset = offset + header_len;
        let size = header.size() as usize;
        if payload_offset + size > data.len() {
            tracing::warn!(
                offset,
                declared_size = size,
                file_len = data.len(),
                "record payload extends past end of file, stopping recovery scan"
            );
            break;
        }

        if header.is_deleted() {
            deleted_count += 1;
            deleted_size += u64::from(header.size());
        } else {
            let size = header.size();
            index.insert(
                header.into_path(),
                IndexEntry {
                    size,
                    payload_offset: payload_offset as u64,
                },
            );
        }

        offset = payload_offset + size;
    }

    Ok(ScanReport {
        index,
        deleted_count,
        deleted_size,
        log_end: offset as u64,
    })
}
