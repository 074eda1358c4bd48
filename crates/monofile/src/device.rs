//! Byte-level access to the backing file.
//!
//! A [`Device`] wraps one open file handle and exposes positional reads and
//! writes at absolute offsets. It performs no buffering beyond what the OS
//! provides and keeps no notion of records; the store layers record
//! semantics on top.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::StoreError;

/// Random-access handle over the backing file.
///
/// The file is opened for both reading and writing; the same path may be
/// read while a write handle is open within one process. All writes go
/// through explicit offsets, so the handle carries no cursor state.
#[derive(Debug)]
pub(crate) struct Device {
    path: PathBuf,
    file: File,
}

impl Device {
    /// Opens the backing file, creating it empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Returns the path this device was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current file length in bytes.
    pub fn len(&self) -> Result<u64, StoreError> {
        Ok(self.file.metadata()?.len())
    }

    /// Reads exactly `buf.len()` bytes at the given absolute offset.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), StoreError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(buf, offset)?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            use std::os::windows::fs::FileExt;
            let mut pos = 0;
            while pos < buf.len() {
                let n = self.file.seek_read(&mut buf[pos..], offset + pos as u64)?;
                if n == 0 {
                    return Err(StoreError::UnexpectedEof);
                }
                pos += n;
            }
            Ok(())
        }
    }

    /// Reads the entire file into memory.
    pub fn read_all(&self) -> Result<Bytes, StoreError> {
        let data = fs::read(&self.path)?;
        Ok(Bytes::from(data))
    }

    /// Writes all of `buf` at the given absolute offset.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<(), StoreError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.write_all_at(buf, offset)?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            use std::os::windows::fs::FileExt;
            let mut pos = 0;
            while pos < buf.len() {
                let n = self.file.seek_write(&buf[pos..], offset + pos as u64)?;
                if n == 0 {
                    return Err(StoreError::Io {
                        source: std::io::Error::new(
                            std::io::ErrorKind::WriteZero,
                            "failed to write whole buffer",
                        ),
                    });
                }
                pos += n;
            }
            Ok(())
        }
    }

    /// Appends `buf` at the current end of file and returns the offset the
    /// bytes were written at.
    pub fn append(&self, buf: &[u8]) -> Result<u64, StoreError> {
        let offset = self.len()?;
        self.write_all_at(offset, buf)?;
        Ok(offset)
    }

    /// Truncates the file to the given length.
    pub fn truncate(&self, len: u64) -> Result<(), StoreError> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// Syncs file data and metadata to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Replaces the file at `target` with this device's file.
    ///
    /// The original at `target` is deleted, then this device's file is
    /// renamed over it. The open handle stays valid across the rename and
    /// the device answers to `target` from then on.
    pub fn persist_as(&mut self, target: &Path) -> Result<(), StoreError> {
        fs::remove_file(target)?;
        fs::rename(&self.path, target)?;
        self.path = target.to_path_buf();
        Ok(())
    }
}
