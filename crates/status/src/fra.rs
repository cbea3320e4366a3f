//! Mapped view of the directory status table.

use std::fs::OpenOptions;
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use zerocopy::{FromBytes, IntoBytes};

use crate::layout::{DirEntry, FsaHeader, STATUS_LAYOUT_VERSION, TABLE_HEADER_LEN};
use crate::lock::{LockClass, RegionGuard, lock_offset};
use crate::{Result, StatusError};

/// Shared directory table, attached by retrieve workers.
///
/// Same file shape as the host table: a 16-byte header followed by fixed
/// records. Only the error-counter and status-bit lock classes are used
/// here; a directory has no per-slot state.
#[derive(Debug)]
pub struct Fra {
    path: PathBuf,
    map: MmapMut,
    fd: RawFd,
    _file: std::fs::File,
}

impl Fra {
    /// Creates the table file at `path` seeded with `entries`.
    pub fn create(path: &Path, entries: &[DirEntry]) -> Result<Self> {
        let len = TABLE_HEADER_LEN + entries.len() * size_of::<DirEntry>();
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
        // SAFETY: concurrent mappers coordinate through byte-range locks.
        let mut map = unsafe { MmapMut::map_mut(&file) }.map_err(|source| StatusError::Map {
            path: path.to_path_buf(),
            source,
        })?;

        let header = FsaHeader::new(entries.len() as i32);
        map[..TABLE_HEADER_LEN].copy_from_slice(header.as_bytes());
        for (i, entry) in entries.iter().enumerate() {
            let off = TABLE_HEADER_LEN + i * size_of::<DirEntry>();
            map[off..off + size_of::<DirEntry>()].copy_from_slice(entry.as_bytes());
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
        let fra = Self {
            path: path.to_path_buf(),
            map,
            fd,
            _file: file,
        };
        fra.validate()?;
        Ok(fra)
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
        let need = TABLE_HEADER_LEN + header.record_count.max(0) as usize * size_of::<DirEntry>();
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
        FsaHeader::ref_from_bytes(&self.map[..TABLE_HEADER_LEN]).unwrap_or_else(|_| unreachable!())
    }

    /// Number of directory records in the table.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.header().record_count.max(0) as usize
    }

    fn record_range(&self, index: usize) -> Result<std::ops::Range<usize>> {
        let count = self.record_count();
        if index >= count {
            return Err(StatusError::OutOfRange { index, count });
        }
        let start = TABLE_HEADER_LEN + index * size_of::<DirEntry>();
        Ok(start..start + size_of::<DirEntry>())
    }

    /// Borrows the directory record at `index`.
    pub fn dir(&self, index: usize) -> Result<&DirEntry> {
        let range = self.record_range(index)?;
        Ok(DirEntry::ref_from_bytes(&self.map[range]).unwrap_or_else(|_| unreachable!()))
    }

    /// Mutably borrows the directory record at `index`.
    ///
    /// Error counter and status bits additionally need their lock class;
    /// use [`Fra::with_locked`] for those.
    pub fn dir_mut(&mut self, index: usize) -> Result<&mut DirEntry> {
        let range = self.record_range(index)?;
        Ok(DirEntry::mut_from_bytes(&mut self.map[range]).unwrap_or_else(|_| unreachable!()))
    }

    /// Finds a directory record by alias.
    #[must_use]
    pub fn find_dir(&self, alias: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.dir(i).is_ok_and(|d| d.alias() == alias))
    }

    /// Takes the `class` lock for the record at `index`.
    pub fn lock(&self, index: usize, class: LockClass) -> Result<RegionGuard> {
        self.record_range(index)?;
        RegionGuard::acquire(
            self.fd,
            lock_offset(TABLE_HEADER_LEN, size_of::<DirEntry>(), index, class),
        )
    }

    /// Runs `f` on the record at `index` while holding the `class` lock.
    pub fn with_locked<R>(
        &mut self,
        index: usize,
        class: LockClass,
        f: impl FnOnce(&mut DirEntry) -> R,
    ) -> Result<R> {
        let _guard = self.lock(index, class)?;
        Ok(f(self.dir_mut(index)?))
    }

    /// Bumps the directory error counter under its lock class.
    pub fn bump_error_counter(&mut self, index: usize) -> Result<u32> {
        self.with_locked(index, LockClass::Errors, |dir| {
            dir.error_counter = dir.error_counter.saturating_add(1);
            dir.error_counter
        })
    }

    /// Resets the directory error counter under its lock class.
    pub fn clear_error_counter(&mut self, index: usize) -> Result<()> {
        self.with_locked(index, LockClass::Errors, |dir| {
            dir.error_counter = 0;
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StupidMode;

    #[test]
    fn create_then_attach_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dir_table");
        let mut seed = DirEntry::new("wx-charts");
        seed.stupid_mode = StupidMode::GetOnceOnly as u8;
        Fra::create(&path, &[seed]).expect("create");

        let fra = Fra::attach(&path).expect("attach");
        assert_eq!(fra.record_count(), 1);
        let entry = fra.dir(0).expect("record");
        assert_eq!(entry.alias(), "wx-charts");
        assert_eq!(entry.mode(), StupidMode::GetOnceOnly);
        assert_eq!(entry.ignore_size, -1);
        assert_eq!(fra.find_dir("wx-charts"), Some(0));
    }

    #[test]
    fn error_counter_moves_under_lock() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dir_table");
        let mut fra = Fra::create(&path, &[DirEntry::new("d")]).expect("create");

        assert_eq!(fra.bump_error_counter(0).expect("bump"), 1);
        assert_eq!(fra.bump_error_counter(0).expect("bump"), 2);
        fra.clear_error_counter(0).expect("clear");
        assert_eq!(fra.dir(0).expect("record").error_counter, 0);
    }
}
