//! Mapped view of the host status table.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use zerocopy::{FromBytes, IntoBytes};

use crate::flags::FeatureFlags;
use crate::layout::{
    CONNECT_DISCONNECT, CONNECT_NOT_WORKING, ERROR_HISTORY_LEN, FEATURE_FLAG_BACK_OFFSET,
    FsaHeader, HostEntry, STATUS_LAYOUT_VERSION, TABLE_HEADER_LEN,
};
use crate::lock::{LockClass, RegionGuard, lock_offset};
use crate::{Result, StatusError};

/// Shared host table, attached by every worker for the life of a session.
#[derive(Debug)]
pub struct Fsa {
    path: PathBuf,
    map: MmapMut,
    fd: RawFd,
    // Keeps the descriptor (and with it the advisory locks) alive.
    _file: std::fs::File,
}

impl Fsa {
    /// Creates the table file at `path` seeded with `entries`.
    ///
    /// Only the scheduler side and tests create tables; workers attach.
    pub fn create(path: &Path, entries: &[HostEntry]) -> Result<Self> {
        let len = TABLE_HEADER_LEN + entries.len() * size_of::<HostEntry>();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| StatusError::Map {
                path: path.to_path_buf(),
                source,
            })?;
        file.set_len(len as u64).map_err(|source| StatusError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        // SAFETY: the mapping is private to this file handle; concurrent
        // mappers coordinate through the byte-range locks.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| StatusError::Map {
            path: path.to_path_buf(),
            source,
        })?;

        let header = FsaHeader::new(entries.len() as i32);
        map[..TABLE_HEADER_LEN].copy_from_slice(header.as_bytes());
        for (i, entry) in entries.iter().enumerate() {
            let off = TABLE_HEADER_LEN + i * size_of::<HostEntry>();
            map[off..off + size_of::<HostEntry>()].copy_from_slice(entry.as_bytes());
        }

        let fd = file.as_raw_fd();
        Ok(Self {
            path: path.to_path_buf(),
            map,
            fd,
            _file: file,
        })
    }

    /// Attaches to an existing table.
    pub fn attach(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| StatusError::Map {
                path: path.to_path_buf(),
                source,
            })?;
        // SAFETY: see `create`.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| StatusError::Map {
            path: path.to_path_buf(),
            source,
        })?;
        let fd = file.as_raw_fd();
        let fsa = Self {
            path: path.to_path_buf(),
            map,
            fd,
            _file: file,
        };
        fsa.validate()?;
        Ok(fsa)
    }

    fn validate(&self) -> Result<()> {
        if self.map.len() < TABLE_HEADER_LEN {
            return Err(StatusError::Truncated {
                path: self.path.clone(),
                actual: self.map.len(),
                expected: TABLE_HEADER_LEN,
            });
        }
        let header = self.header();
        if header.version != STATUS_LAYOUT_VERSION {
            return Err(StatusError::Version {
                path: self.path.clone(),
                found: header.version,
                expected: STATUS_LAYOUT_VERSION,
            });
        }
        let need = TABLE_HEADER_LEN + header.record_count.max(0) as usize * size_of::<HostEntry>();
        if self.map.len() < need {
            return Err(StatusError::Truncated {
                path: self.path.clone(),
                actual: self.map.len(),
                expected: need,
            });
        }
        Ok(())
    }

    fn header(&self) -> &FsaHeader {
        // Length checked in validate(); the header starts at offset 0 of a
        // page-aligned mapping, so the cast cannot fail.
        FsaHeader::ref_from_bytes(&self.map[..TABLE_HEADER_LEN]).unwrap_or_else(|_| unreachable!())
    }

    /// Number of host records in the table.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.header().record_count.max(0) as usize
    }

    /// Reads the process-wide feature byte.
    #[must_use]
    pub fn feature_flags(&self) -> FeatureFlags {
        FeatureFlags::from_bits_truncate(self.map[TABLE_HEADER_LEN - FEATURE_FLAG_BACK_OFFSET])
    }

    /// Overwrites the process-wide feature byte.
    pub fn set_feature_flags(&mut self, flags: FeatureFlags) {
        self.map[TABLE_HEADER_LEN - FEATURE_FLAG_BACK_OFFSET] = flags.bits();
    }

    fn record_range(&self, index: usize) -> Result<std::ops::Range<usize>> {
        let count = self.record_count();
        if index >= count {
            return Err(StatusError::OutOfRange { index, count });
        }
        let start = TABLE_HEADER_LEN + index * size_of::<HostEntry>();
        Ok(start..start + size_of::<HostEntry>())
    }

    /// Borrows the host record at `index`.
    pub fn host(&self, index: usize) -> Result<&HostEntry> {
        let range = self.record_range(index)?;
        Ok(HostEntry::ref_from_bytes(&self.map[range]).unwrap_or_else(|_| unreachable!()))
    }

    /// Mutably borrows the host record at `index`.
    ///
    /// The caller is responsible for holding the lock class covering the
    /// fields it writes; prefer [`Fsa::with_locked`].
    pub fn host_mut(&mut self, index: usize) -> Result<&mut HostEntry> {
        let range = self.record_range(index)?;
        Ok(HostEntry::mut_from_bytes(&mut self.map[range]).unwrap_or_else(|_| unreachable!()))
    }

    /// Finds a host record by alias.
    #[must_use]
    pub fn find_host(&self, alias: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.host(i).is_ok_and(|h| h.alias() == alias))
    }

    /// Takes the `class` lock for the record at `index`.
    pub fn lock(&self, index: usize, class: LockClass) -> Result<RegionGuard> {
        self.record_range(index)?;
        RegionGuard::acquire(
            self.fd,
            lock_offset(TABLE_HEADER_LEN, size_of::<HostEntry>(), index, class),
        )
    }

    /// Runs `f` on the record at `index` while holding the `class` lock.
    pub fn with_locked<R>(
        &mut self,
        index: usize,
        class: LockClass,
        f: impl FnOnce(&mut HostEntry) -> R,
    ) -> Result<R> {
        let _guard = self.lock(index, class)?;
        Ok(f(self.host_mut(index)?))
    }

    /// Applies a delta to the aggregate totals under the totals lock.
    ///
    /// Negative results are clamped to zero and logged; a zero file counter
    /// drags the byte total to zero with it.
    pub fn update_totals(&mut self, index: usize, d_files: i64, d_bytes: i64) -> Result<()> {
        self.with_locked(index, LockClass::Totals, |host| {
            let files = i64::from(host.total_file_counter) + d_files;
            if files < 0 {
                tracing::warn!(
                    host = host.alias(),
                    files,
                    "file counter would go negative, clamping"
                );
                host.total_file_counter = 0;
            } else {
                host.total_file_counter = files as i32;
            }

            let bytes = host.total_file_size + d_bytes;
            if bytes < 0 {
                tracing::warn!(
                    host = host.alias(),
                    bytes,
                    "file size total would go negative, clamping"
                );
                host.total_file_size = 0;
            } else {
                host.total_file_size = bytes;
            }

            if host.total_file_counter == 0 && host.total_file_size != 0 {
                tracing::warn!(
                    host = host.alias(),
                    stale = host.total_file_size,
                    "zero files but non-zero size total, repairing"
                );
                host.total_file_size = 0;
            }
        })
    }

    /// Clears the error state of a drained host.
    ///
    /// Called by the send path once both aggregate totals reached zero:
    /// resets the error counter and moves idle slots from not-working to
    /// disconnected so monitors show the host healthy again.
    pub fn clear_host_errors(&mut self, index: usize) -> Result<()> {
        self.with_locked(index, LockClass::Errors, |host| {
            host.error_counter = 0;
            host.error_history = [0; ERROR_HISTORY_LEN];
            for slot in &mut host.job_status {
                if slot.connect_status == CONNECT_NOT_WORKING {
                    slot.connect_status = CONNECT_DISCONNECT;
                }
            }
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor of the backing file, for fault handlers that must
    /// stamp a slot without taking locks.
    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }
}
