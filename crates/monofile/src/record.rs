//! Record codec for the append-only blob log.
//!
//! Each logical blob is stored as one record: a small header followed by the
//! raw payload bytes. The backing file is a strict concatenation of records
//! starting at offset 0, with no global header, footer, or checksum.
//!
//! # Record Format
//!
//! ```text
//! [path_len:u16][path:bytes][size:i32][deleted:u8][payload:bytes]
//!      2B         variable      4B        1B          variable
//! ```
//!
//! All integers are big-endian. `path` is UTF-8, at most 65,535 bytes.
//! `size` is the payload length; it is written as a signed 32-bit value, so
//! payloads are limited to `[0, 2^31)` bytes. `deleted` is the tombstone
//! flag: 0 for a live record, any nonzero value for a deleted one.
//!
//! The *payload offset* of a record is the byte offset immediately after the
//! tombstone flag. Deleting a record flips the single byte at
//! `payload_offset - 1` and touches nothing else.

use crate::StoreError;

/// Maximum encoded path length in bytes (the `u16` length prefix).
pub const MAX_PATH_LEN: usize = u16::MAX as usize;

/// Fixed header overhead besides the path bytes: length prefix (2) +
/// size (4) + tombstone flag (1).
pub const HEADER_OVERHEAD: usize = 7;

/// A decoded record header.
///
/// The codec is stateless: encoding and decoding are free functions over
/// byte slices, and this struct only carries what the header declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    path: String,
    size: u32,
    deleted: bool,
}

impl RecordHeader {
    /// Returns the blob path declared by the header.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the payload size declared by the header.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns true if the tombstone flag is set.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Consumes the header, returning its path.
    pub fn into_path(self) -> String {
        self.path
    }

    /// Serializes a live header (tombstone flag 0) for the given path and
    /// payload size.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidPath`] if the path is empty or exceeds
    ///   [`MAX_PATH_LEN`] bytes
    /// - [`StoreError::PayloadTooLarge`] if the size does not fit the signed
    ///   32-bit size field
    pub fn encode(path: &str, size: usize) -> Result<Vec<u8>, StoreError> {
        validate_path(path)?;
        if size > i32::MAX as usize {
            return Err(StoreError::PayloadTooLarge { len: size });
        }

        let mut buf = Vec::with_capacity(HEADER_OVERHEAD + path.len());
        buf.extend_from_slice(&(path.len() as u16).to_be_bytes());
        buf.extend_from_slice(path.as_bytes());
        buf.extend_from_slice(&(size as i32).to_be_bytes());
        buf.push(0);
        Ok(buf)
    }

    /// Deserializes a record header from the start of `data`.
    ///
    /// `at` is the absolute log offset `data` starts at; it is only carried
    /// into errors so they name the failing record's position. Returns the
    /// parsed header and the number of bytes consumed; the record's payload
    /// begins at the consumed offset. The payload itself is not read here.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnexpectedEof`] if `data` ends inside the header
    /// - [`StoreError::Malformed`] if the path is empty or not UTF-8, or
    ///   the size field is negative
    pub fn decode(data: &[u8], at: u64) -> Result<(Self, usize), StoreError> {
        if data.len() < 2 {
            return Err(StoreError::UnexpectedEof);
        }
        let path_len = u16::from_be_bytes(
            data[0..2].try_into().expect("slice is exactly 2 bytes"),
        ) as usize;
        // Writers never emit an empty path, so a zero length prefix is a
        // reservation or garbage, not a record.
        if path_len == 0 {
            return Err(StoreError::Malformed {
                offset: at,
                reason: "empty path",
            });
        }

        let size_end = 2 + path_len + 4;
        if data.len() < size_end + 1 {
            return Err(StoreError::UnexpectedEof);
        }

        let path = std::str::from_utf8(&data[2..2 + path_len])
            .map_err(|_| StoreError::Malformed {
                offset: at,
                reason: "path is not valid UTF-8",
            })?
            .to_string();

        let size = i32::from_be_bytes(
            data[2 + path_len..size_end]
                .try_into()
                .expect("slice is exactly 4 bytes"),
        );
        if size < 0 {
            return Err(StoreError::Malformed {
                offset: at,
                reason: "negative payload size",
            });
        }

        let deleted = data[size_end] != 0;

        Ok((
            Self {
                path,
                size: size as u32,
                deleted,
            },
            size_end + 1,
        ))
    }

    /// Returns the encoded header length for a path, without allocating.
    pub fn encoded_len(path: &str) -> u64 {
        (HEADER_OVERHEAD + path.len()) as u64
    }
}

/// Returns the offset of the tombstone flag for a record with the given
/// payload offset. This is the single byte that delete flips.
pub fn tombstone_byte_offset(payload_offset: u64) -> u64 {
    payload_offset - 1
}

/// Checks that a path is usable as a record key.
pub(crate) fn validate_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "path must not be empty",
        });
    }
    if path.len() > MAX_PATH_LEN {
        return Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: "path exceeds 65,535 encoded bytes",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_expected_layout() {
        let bytes = RecordHeader::encode("a/b", 5).unwrap();

        // 2 (path len) + 3 (path) + 4 (size) + 1 (flag) = 10 bytes
        assert_eq!(bytes.len(), 10);
        assert_eq!(u16::from_be_bytes(bytes[0..2].try_into().unwrap()), 3);
        assert_eq!(&bytes[2..5], b"a/b");
        assert_eq!(i32::from_be_bytes(bytes[5..9].try_into().unwrap()), 5);
        assert_eq!(bytes[9], 0);
    }

    #[test]
    fn decode_roundtrip() {
        let bytes = RecordHeader::encode("docs/readme.txt", 1024).unwrap();
        let (header, consumed) = RecordHeader::decode(&bytes, 0).unwrap();

        assert_eq!(header.path(), "docs/readme.txt");
        assert_eq!(header.size(), 1024);
        assert!(!header.is_deleted());
        assert_eq!(consumed, bytes.len());
        assert_eq!(consumed as u64, RecordHeader::encoded_len("docs/readme.txt"));
    }

    #[test]
    fn decode_reads_tombstone_flag() {
        let mut bytes = RecordHeader::encode("x", 0).unwrap();
        *bytes.last_mut().unwrap() = 1;

        let (header, _) = RecordHeader::decode(&bytes, 0).unwrap();
        assert!(header.is_deleted());
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let bytes = RecordHeader::encode("key", 7).unwrap();
        for len in 0..bytes.len() {
            let result = RecordHeader::decode(&bytes[..len], 0);
            assert!(
                matches!(result, Err(StoreError::UnexpectedEof)),
                "prefix of {len} bytes should not decode"
            );
        }
    }

    #[test]
    fn decode_rejects_negative_size() {
        let mut bytes = RecordHeader::encode("key", 7).unwrap();
        bytes[5..9].copy_from_slice(&(-1i32).to_be_bytes());

        let result = RecordHeader::decode(&bytes, 0);
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn decode_rejects_invalid_utf8_path() {
        let mut bytes = RecordHeader::encode("ab", 0).unwrap();
        bytes[2] = 0xFF;
        bytes[3] = 0xFE;

        let result = RecordHeader::decode(&bytes, 0);
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }

    #[test]
    fn decode_rejects_zero_length_path() {
        // A zeroed length prefix marks a reservation or garbage, never a
        // record, because encode refuses empty paths.
        let mut bytes = RecordHeader::encode("x", 3).unwrap();
        bytes[0..2].copy_from_slice(&0u16.to_be_bytes());

        let result = RecordHeader::decode(&bytes, 0);
        assert!(matches!(
            result,
            Err(StoreError::Malformed { reason: "empty path", .. })
        ));
    }

    #[test]
    fn decode_errors_carry_the_record_offset() {
        let mut bytes = RecordHeader::encode("key", 7).unwrap();
        bytes[5..9].copy_from_slice(&(-1i32).to_be_bytes());

        let result = RecordHeader::decode(&bytes, 1337);
        assert!(matches!(
            result,
            Err(StoreError::Malformed { offset: 1337, .. })
        ));
    }

    #[test]
    fn encode_rejects_empty_path() {
        let result = RecordHeader::encode("", 0);
        assert!(matches!(result, Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn encode_rejects_oversized_path() {
        let long = "p".repeat(MAX_PATH_LEN + 1);
        let result = RecordHeader::encode(&long, 0);
        assert!(matches!(result, Err(StoreError::InvalidPath { .. })));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let result = RecordHeader::encode("key", i32::MAX as usize + 1);
        assert!(matches!(result, Err(StoreError::PayloadTooLarge { .. })));
    }

    #[test]
    fn tombstone_flag_sits_before_payload() {
        let bytes = RecordHeader::encode("k", 9).unwrap();
        let (_, consumed) = RecordHeader::decode(&bytes, 0).unwrap();
        let payload_offset = consumed as u64;

        assert_eq!(tombstone_byte_offset(payload_offset), payload_offset - 1);
        assert_eq!(bytes[tombstone_byte_offset(payload_offset) as usize], 0);
    }
}
