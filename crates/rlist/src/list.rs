//! The mapped retrieve-list container.

use std::fs::{File, OpenOptions};
use std::mem::size_of;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use status::lock::RegionGuard;
use zerocopy::{FromBytes, IntoBytes};

use crate::layout::{NO, RL_HEADER_LEN, RL_LAYOUT_VERSION, RETRIEVE_STEP, RlEntry, RlHeader, YES};
use crate::{Result, RlError};

#[derive(Debug)]
enum Backing {
    /// Persistent list shared between sessions and workers.
    File { file: File, path: PathBuf },
    /// Session-only list; dies with the worker.
    Anon,
}

/// The shared catalog of one retrieve directory.
#[derive(Debug)]
pub struct RetrieveList {
    map: MmapMut,
    backing: Backing,
}

fn map_file(file: &File, path: &Path) -> Result<MmapMut> {
    // SAFETY: concurrent mappers of the list coordinate through the
    // per-record byte-range locks.
    unsafe { MmapMut::map_mut(file) }.map_err(|source| RlError::Map {
        path: path.to_path_buf(),
        source,
    })
}

fn bytes_for(records: usize) -> usize {
    RL_HEADER_LEN + records * size_of::<RlEntry>()
}

impl RetrieveList {
    /// Opens (or creates) the persistent list backing file at `path`.
    pub fn open_persistent(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| RlError::Map {
                path: path.to_path_buf(),
                source,
            })?;
        let len = file
            .metadata()
            .map_err(|source| RlError::Map {
                path: path.to_path_buf(),
                source,
            })?
            .len() as usize;

        if len == 0 {
            file.set_len(bytes_for(RETRIEVE_STEP) as u64)
                .map_err(|source| RlError::Map {
                    path: path.to_path_buf(),
                    source,
                })?;
            let mut map = map_file(&file, path)?;
            map[..RL_HEADER_LEN].copy_from_slice(RlHeader::new().as_bytes());
            return Ok(Self {
                map,
                backing: Backing::File {
                    file,
                    path: path.to_path_buf(),
                },
            });
        }

        if len < RL_HEADER_LEN {
            return Err(RlError::Corrupt {
                path: path.to_path_buf(),
                reason: "shorter than the header",
            });
        }
        let map = map_file(&file, path)?;
        let list = Self {
            map,
            backing: Backing::File {
                file,
                path: path.to_path_buf(),
            },
        };
        let header = list.header();
        if header.version != RL_LAYOUT_VERSION {
            return Err(RlError::Corrupt {
                path: path.to_path_buf(),
                reason: "layout version mismatch",
            });
        }
        if bytes_for(header.no_of_listed_files.max(0) as usize) > len {
            return Err(RlError::Corrupt {
                path: path.to_path_buf(),
                reason: "record count exceeds file size",
            });
        }
        Ok(list)
    }

    /// Creates a session-only list in anonymous memory.
    pub fn open_session() -> Result<Self> {
        let mut map = MmapMut::map_anon(bytes_for(RETRIEVE_STEP)).map_err(|source| RlError::Map {
            path: PathBuf::from("<session>"),
            source,
        })?;
        map[..RL_HEADER_LEN].copy_from_slice(RlHeader::new().as_bytes());
        Ok(Self {
            map,
            backing: Backing::Anon,
        })
    }

    fn header(&self) -> &RlHeader {
        RlHeader::ref_from_bytes(&self.map[..RL_HEADER_LEN]).unwrap_or_else(|_| unreachable!())
    }

    fn header_mut(&mut self) -> &mut RlHeader {
        RlHeader::mut_from_bytes(&mut self.map[..RL_HEADER_LEN]).unwrap_or_else(|_| unreachable!())
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.header().no_of_listed_files.max(0) as usize
    }

    /// Whether the catalog holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records the mapping currently has room for.
    #[must_use]
    pub fn capacity(&self) -> usize {
        (self.map.len() - RL_HEADER_LEN) / size_of::<RlEntry>()
    }

    /// Whether this list survives the session.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }

    fn entry_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = RL_HEADER_LEN + index * size_of::<RlEntry>();
        start..start + size_of::<RlEntry>()
    }

    /// Borrows the record at `index`. Panics on out-of-range indices; the
    /// callers iterate `0..len()`.
    #[must_use]
    pub fn entry(&self, index: usize) -> &RlEntry {
        assert!(index < self.len(), "record index out of range");
        let range = self.entry_range(index);
        RlEntry::ref_from_bytes(&self.map[range]).unwrap_or_else(|_| unreachable!())
    }

    /// Mutably borrows the record at `index`.
    #[must_use]
    pub fn entry_mut(&mut self, index: usize) -> &mut RlEntry {
        assert!(index < self.len(), "record index out of range");
        let range = self.entry_range(index);
        RlEntry::mut_from_bytes(&mut self.map[range]).unwrap_or_else(|_| unreachable!())
    }

    /// Linear search by stored name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        (0..self.len()).find(|&i| self.entry(i).name() == name)
    }

    /// Grows the mapping by one step.
    ///
    /// A failed remap poisons the shared catalog, so the caller must treat
    /// the error as fatal to the worker.
    fn grow(&mut self) -> Result<()> {
        let new_bytes = bytes_for(self.capacity() + RETRIEVE_STEP);
        match &self.backing {
            Backing::File { file, path } => {
                file.set_len(new_bytes as u64).map_err(|source| RlError::Map {
                    path: path.clone(),
                    source,
                })?;
                self.map = map_file(file, path)?;
            }
            Backing::Anon => {
                let mut map = MmapMut::map_anon(new_bytes).map_err(|source| RlError::Map {
                    path: PathBuf::from("<session>"),
                    source,
                })?;
                map[..self.map.len()].copy_from_slice(&self.map);
                self.map = map;
            }
        }
        Ok(())
    }

    /// Appends a fresh record, growing the mapping at step boundaries.
    pub fn push(&mut self, entry: RlEntry) -> Result<usize> {
        let index = self.len();
        if index == self.capacity() {
            self.grow()?;
        }
        let range = self.entry_range(index);
        self.map[range].copy_from_slice(entry.as_bytes());
        self.header_mut().no_of_listed_files = (index + 1) as i32;
        Ok(index)
    }

    /// Takes the byte-range lock of the record at `index`.
    ///
    /// Session-only lists have exactly one attached process, so they return
    /// no guard.
    pub fn lock_entry(&self, index: usize) -> Result<Option<RegionGuard>> {
        match &self.backing {
            Backing::File { file, .. } => {
                let start = (RL_HEADER_LEN + index * size_of::<RlEntry>()) as i64;
                Ok(Some(RegionGuard::acquire(file.as_raw_fd(), start)?))
            }
            Backing::Anon => Ok(None),
        }
    }

    /// Clears the scan marker of every record before a new listing pass.
    pub fn begin_scan(&mut self) {
        for i in 0..self.len() {
            self.entry_mut(i).in_list = NO;
        }
    }

    /// Drops every record the scan did not see.
    ///
    /// Only meaningful for persistent bookkeeping; the caller ensures the
    /// directory mode wants compaction.
    pub fn compact(&mut self) {
        let len = self.len();
        let mut keep = 0usize;
        for i in 0..len {
            if self.entry(i).in_list == YES {
                if keep != i {
                    let src = self.entry_range(i);
                    let dst_start = RL_HEADER_LEN + keep * size_of::<RlEntry>();
                    self.map.copy_within(src, dst_start);
                }
                keep += 1;
            }
        }
        if keep != len {
            tracing::debug!(dropped = len - keep, "compacted vanished records");
            self.header_mut().no_of_listed_files = keep as i32;
        }
    }

    /// Releases every record still stamped with `worker_stamp`.
    ///
    /// Part of the worker exit path, so a crashed session never leaves a
    /// claim behind.
    pub fn release_assignments(&mut self, worker_stamp: u8) {
        for i in 0..self.len() {
            let entry = self.entry_mut(i);
            if entry.assigned == worker_stamp {
                entry.assigned = 0;
            }
        }
    }

    /// Detaches from the catalog, removing the backing file when the
    /// directory mode does not persist state.
    pub fn detach(self, destroy: bool) -> Result<()> {
        if let Backing::File { path, .. } = &self.backing {
            if destroy {
                std::fs::remove_file(path).map_err(|source| RlError::Map {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::RlEntry;

    #[test]
    fn persistent_list_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ls_data");
        {
            let mut list = RetrieveList::open_persistent(&path).expect("create");
            list.push(RlEntry::new("a", 1, 10, true)).expect("push");
            list.push(RlEntry::new("b", 2, 20, true)).expect("push");
        }
        let list = RetrieveList::open_persistent(&path).expect("reopen");
        assert_eq!(list.len(), 2);
        assert_eq!(list.entry(0).name(), "a");
        assert_eq!(list.find("b"), Some(1));
        assert!(list.is_persistent());
    }

    #[test]
    fn session_list_grows_past_step_boundary() {
        let mut list = RetrieveList::open_session().expect("session");
        for i in 0..(RETRIEVE_STEP + 3) {
            list.push(RlEntry::new(&format!("f{i}"), i as i64, 0, false))
                .expect("push");
        }
        assert_eq!(list.len(), RETRIEVE_STEP + 3);
        assert!(list.capacity() >= RETRIEVE_STEP * 2);
        assert_eq!(list.entry(RETRIEVE_STEP).name(), format!("f{RETRIEVE_STEP}"));
    }

    #[test]
    fn compaction_drops_unseen_records() {
        let mut list = RetrieveList::open_session().expect("session");
        for name in ["a", "b", "c", "d"] {
            list.push(RlEntry::new(name, 1, 0, false)).expect("push");
        }
        list.begin_scan();
        list.entry_mut(0).in_list = YES;
        list.entry_mut(2).in_list = YES;
        list.compact();

        assert_eq!(list.len(), 2);
        assert_eq!(list.entry(0).name(), "a");
        assert_eq!(list.entry(1).name(), "c");
    }

    #[test]
    fn release_clears_only_this_workers_stamps() {
        let mut list = RetrieveList::open_session().expect("session");
        list.push(RlEntry::new("a", 1, 0, false)).expect("push");
        list.push(RlEntry::new("b", 1, 0, false)).expect("push");
        list.entry_mut(0).assigned = 2;
        list.entry_mut(1).assigned = 3;

        list.release_assignments(2);
        assert_eq!(list.entry(0).assigned, 0);
        assert_eq!(list.entry(1).assigned, 3);
    }

    #[test]
    fn detach_destroy_removes_the_backing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ls_data");
        let list = RetrieveList::open_persistent(&path).expect("create");
        list.detach(true).expect("detach");
        assert!(!path.exists());
    }

    #[test]
    fn entry_locks_are_per_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ls_data");
        let mut list = RetrieveList::open_persistent(&path).expect("create");
        list.push(RlEntry::new("a", 1, 0, false)).expect("push");
        list.push(RlEntry::new("b", 1, 0, false)).expect("push");

        let g0 = list.lock_entry(0).expect("lock").expect("guard");
        let g1 = list.lock_entry(1).expect("lock").expect("guard");
        drop(g0);
        drop(g1);
    }
}
