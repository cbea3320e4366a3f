//! Advisory byte-range locks over the mapped tables.
//!
//! Every record reserves one lock byte per class; the byte's file offset is
//! `header + record * record_size + class`. Locks are `fcntl` write locks,
//! so they exclude other workers but never this process against itself;
//! each worker is single-threaded by construction.

use std::io;
use std::os::unix::io::RawFd;

use crate::{Result, StatusError};

/// The independently lockable field groups of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockClass {
    /// Connection state: `connect_status`, `no_of_files`, `connections`.
    Connect = 0,
    /// Aggregate totals: file counter, file size, done counters.
    Totals = 1,
    /// Error counters and error history.
    Errors = 2,
    /// The status bitset of the record.
    StatusBits = 3,
}

/// Number of lock bytes reserved per record.
pub const LOCK_BYTES_PER_RECORD: usize = 4;

fn range_op(fd: RawFd, cmd: libc::c_int, lock_type: libc::c_short, start: i64) -> io::Result<()> {
    let mut region: libc::flock = unsafe { std::mem::zeroed() };
    region.l_type = lock_type;
    region.l_whence = libc::SEEK_SET as libc::c_short;
    region.l_start = start;
    region.l_len = 1;
    loop {
        // SAFETY: fd is a live descriptor owned by the table view that
        // outlives this guard; flock is a plain POD out-parameter.
        let rc = unsafe { libc::fcntl(fd, cmd, &region) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// A held byte-range lock, released on drop.
#[derive(Debug)]
pub struct RegionGuard {
    fd: RawFd,
    start: i64,
}

impl RegionGuard {
    /// Blocks until the lock byte at `start` is granted on `fd`.
    pub fn acquire(fd: RawFd, start: i64) -> Result<Self> {
        range_op(fd, libc::F_SETLKW, libc::F_WRLCK as libc::c_short, start)
            .map_err(StatusError::Lock)?;
        Ok(Self { fd, start })
    }

    /// File offset of the held lock byte.
    #[must_use]
    pub fn start(&self) -> i64 {
        self.start
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        // Unlock failures cannot be reported from drop; the lock dies with
        // the descriptor anyway.
        let _ = range_op(
            self.fd,
            libc::F_SETLK,
            libc::F_UNLCK as libc::c_short,
            self.start,
        );
    }
}

/// Computes the lock-byte offset for `record` and `class`.
#[must_use]
pub fn lock_offset(header_len: usize, record_size: usize, record: usize, class: LockClass) -> i64 {
    (header_len + record * record_size) as i64 + class as i64
}
