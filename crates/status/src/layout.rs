//! Frozen on-disk record layouts for the mapped status tables.
//!
//! Every struct here is `#[repr(C)]` with explicit padding so the byte image
//! is identical on every platform we map the tables from. Changing any field
//! is a format break and must bump [`STATUS_LAYOUT_VERSION`].

use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Version word written into every table header.
pub const STATUS_LAYOUT_VERSION: u32 = 3;

/// Bytes reserved in front of the first record of a mapped table.
pub const TABLE_HEADER_LEN: usize = 16;

/// Distance of the global feature-flag byte back from the first record.
///
/// The byte lives inside the header, `FEATURE_FLAG_BACK_OFFSET` bytes before
/// the first host record, so monitors that only know the record base can
/// still find it.
pub const FEATURE_FLAG_BACK_OFFSET: usize = 8;

/// Bound on a host alias, including the trailing NUL.
pub const HOST_ALIAS_LEN: usize = 40;

/// Bound on one real host name, including the trailing NUL.
pub const REAL_HOSTNAME_LEN: usize = 64;

/// Bound on a directory alias, including the trailing NUL.
pub const DIR_ALIAS_LEN: usize = 40;

/// Bound on a stored URL or work-directory path.
pub const DIR_PATH_LEN: usize = 128;

/// Bound on a file name stored in a job slot.
pub const SLOT_FILE_NAME_LEN: usize = 256;

/// Bound on the unique job name stored in a job slot.
pub const SLOT_UNIQUE_NAME_LEN: usize = 48;

/// Number of job slots carried by every host record.
///
/// `allowed_transfers` may be configured lower but never higher.
pub const MAX_JOB_SLOTS: usize = 5;

/// Depth of the rotating error history per host.
pub const ERROR_HISTORY_LEN: usize = 5;

/// `connect_status` value for a slot with no worker attached.
pub const CONNECT_NOT_WORKING: u8 = 0;
/// `connect_status` value while a worker holds the slot but is idle.
pub const CONNECT_DISCONNECT: u8 = 1;
/// `connect_status` value while a transfer is in progress.
pub const CONNECT_ACTIVE: u8 = 2;
/// `connect_status` value stamped by the fault handler before aborting.
pub const CONNECT_FAULTY: u8 = 3;

/// Shared table header.
///
/// The feature-flag byte sits at offset `TABLE_HEADER_LEN -
/// FEATURE_FLAG_BACK_OFFSET` so it can be located relative to either end.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FsaHeader {
    /// Layout version, compared against [`STATUS_LAYOUT_VERSION`] on attach.
    pub version: u32,
    /// Number of records that follow the header.
    pub record_count: i32,
    /// Process-wide feature switches, see [`crate::flags::FeatureFlags`].
    pub feature_flags: u8,
    _pad: [u8; 7],
}

impl FsaHeader {
    /// Builds a header for a freshly created table.
    #[must_use]
    pub fn new(record_count: i32) -> Self {
        Self {
            version: STATUS_LAYOUT_VERSION,
            record_count,
            feature_flags: 0,
            _pad: [0; 7],
        }
    }
}

/// Per-connection status block inside a host record.
///
/// A slot is owned exclusively by the worker whose job number equals the
/// slot index; nobody else writes it, so no lock class covers slot fields.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct JobSlot {
    /// Size of the file currently in flight, or 0.
    pub file_size_in_use: i64,
    /// Bytes of the in-flight file already moved.
    pub file_size_in_use_done: i64,
    /// Total size of the current batch.
    pub file_size: i64,
    /// Bytes of the current batch already moved.
    pub file_size_done: i64,
    /// Bytes put on the wire by this slot since it was claimed.
    pub bytes_send: u64,
    /// Identifier of the job the slot is processing.
    pub job_id: u32,
    /// Files in the current batch.
    pub no_of_files: i32,
    /// Files of the current batch already finished.
    pub no_of_files_done: i32,
    /// One of the `CONNECT_*` constants.
    pub connect_status: u8,
    _pad: [u8; 3],
    /// Unique name of the job directory being processed, NUL-terminated.
    pub unique_name: [u8; SLOT_UNIQUE_NAME_LEN],
    /// Name of the file currently in flight, NUL-terminated.
    pub file_name_in_use: [u8; SLOT_FILE_NAME_LEN],
}

impl JobSlot {
    /// Clears the slot back to its idle state.
    pub fn reset(&mut self) {
        *self = Self::new_zeroed();
        self.connect_status = CONNECT_NOT_WORKING;
    }

    /// Stores `name` into `file_name_in_use`, truncating and NUL-terminating.
    pub fn set_file_in_use(&mut self, name: &str) {
        write_bounded(&mut self.file_name_in_use, name.as_bytes());
    }

    /// Stores `name` into `unique_name`, truncating and NUL-terminating.
    pub fn set_unique_name(&mut self, name: &str) {
        write_bounded(&mut self.unique_name, name.as_bytes());
    }
}

/// One record of the host table.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct HostEntry {
    /// Per-process transfer rate limit in bytes per second, 0 = unlimited.
    pub trl_per_process: u64,
    /// Aggregate bytes still queued for this host.
    pub total_file_size: i64,
    /// Bytes put on the wire for this host, all slots combined.
    pub bytes_send: u64,
    /// Unix time of the most recent connection.
    pub last_connection: i64,

    /// Bitmask of protocols configured for this host.
    pub protocol: u32,
    /// Feature toggles, see [`crate::flags::ProtocolOptions`].
    pub protocol_options: u32,
    /// Status bits, see [`crate::flags::HostStatus`].
    pub host_status: u32,
    /// Transfer block size in bytes.
    pub block_size: u32,
    /// Index of the size column in long listings, -1 when unused.
    pub file_size_offset: i32,
    /// Upper bound on concurrently open connections.
    pub allowed_transfers: u32,
    /// Connections currently open.
    pub active_transfers: u32,
    /// Consecutive failed sessions.
    pub error_counter: u32,
    /// Aggregate files still queued for this host.
    pub total_file_counter: i32,
    /// Files delivered since the counter was last reset.
    pub file_counter_done: u32,
    /// Sessions opened since the table was created.
    pub connections: u32,
    /// Event handle stamped when the host entered an error state.
    pub start_event_handle: u32,
    /// Event handle stamped when the error state cleared.
    pub end_event_handle: u32,
    _pad0: [u8; 4],

    /// Which of the two real host names is live (1 or 2).
    pub host_toggle: u8,
    /// Exit codes of the most recent sessions, newest first.
    pub error_history: [u8; ERROR_HISTORY_LEN],
    /// Alias the scheduler and logs refer to this host by, NUL-terminated.
    pub host_alias: [u8; HOST_ALIAS_LEN],
    /// Primary and failover host names, NUL-terminated.
    pub real_hostname: [[u8; REAL_HOSTNAME_LEN]; 2],
    _pad1: [u8; 2],

    /// Per-connection slots, indexed by job number.
    pub job_status: [JobSlot; MAX_JOB_SLOTS],
}

impl HostEntry {
    /// Builds a zeroed record carrying `alias` and `hostname`.
    #[must_use]
    pub fn new(alias: &str, hostname: &str) -> Self {
        let mut entry = Self::new_zeroed();
        write_bounded(&mut entry.host_alias, alias.as_bytes());
        write_bounded(&mut entry.real_hostname[0], hostname.as_bytes());
        entry.host_toggle = 1;
        entry.allowed_transfers = MAX_JOB_SLOTS as u32;
        entry.block_size = 4096;
        entry.file_size_offset = -1;
        entry
    }

    /// The host alias as UTF-8, up to the first NUL.
    #[must_use]
    pub fn alias(&self) -> &str {
        read_bounded(&self.host_alias)
    }

    /// The real host name selected by the current toggle.
    #[must_use]
    pub fn live_hostname(&self) -> &str {
        let side = if self.host_toggle == 2 { 1 } else { 0 };
        read_bounded(&self.real_hostname[side])
    }
}

/// Operational mode of the retrieve list kept for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StupidMode {
    /// Full bookkeeping: the list persists and entries age out by scan.
    No = 0,
    /// No memory between sessions; every listed file is fetched again.
    Yes = 1,
    /// Remember names forever; fetch each file exactly once.
    GetOnceOnly = 2,
    /// Refetch only the bytes appended since the previous download.
    AppendOnly = 3,
}

impl StupidMode {
    /// Decodes the stored byte, treating unknown values as full bookkeeping.
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Yes,
            2 => Self::GetOnceOnly,
            3 => Self::AppendOnly,
            _ => Self::No,
        }
    }
}

/// One record of the directory table.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct DirEntry {
    /// Modification time of the remote directory after the last full scan.
    pub dir_mtime: i64,
    /// Size the size-predicate compares against, -1 = accept any size.
    pub ignore_size: i64,
    /// Byte cap for one retrieve session.
    pub max_copied_file_size: i64,

    /// Age threshold for deleting unknown files, -2 forces deletion.
    pub unknown_file_time: i32,
    /// Age threshold for deleting files the server refuses to hand out.
    pub unreadable_file_time: i32,
    /// Age the time-predicate compares against, 0 = predicate disabled.
    pub ignore_file_time: i32,
    /// File-count cap for one retrieve session.
    pub max_copied_files: u32,
    /// Permission bits applied to fetched files.
    pub dir_mode: u32,
    /// Scan-state bits, see [`crate::flags::DirFlags`].
    pub dir_flag: u32,
    /// Behaviour toggles, see [`crate::flags::DirOptions`].
    pub dir_options: u32,
    /// Directory health as shown by monitors.
    pub dir_status: u32,
    /// Consecutive failed scans.
    pub error_counter: u32,
    _pad0: [u8; 4],

    /// Raw [`StupidMode`] discriminant.
    pub stupid_mode: u8,
    /// Delete remote files after a successful download.
    pub remove: u8,
    /// Skip the directory-mtime shortcut and always list.
    pub force_reread: u8,
    /// Relation selectors for the size and time predicates,
    /// see [`crate::flags::SelectorSet`].
    pub gt_lt_sign: u8,
    /// Which classes of files may be deleted remotely,
    /// see [`crate::flags::DirFlags`] delete bits.
    pub delete_files_flag: u8,
    _pad1: [u8; 3],

    /// Alias the scheduler and logs refer to this directory by.
    pub dir_alias: [u8; DIR_ALIAS_LEN],
    /// URL of the watched remote directory.
    pub url: [u8; DIR_PATH_LEN],
    /// Local directory fetched files are renamed into.
    pub retrieve_work_dir: [u8; DIR_PATH_LEN],
}

impl DirEntry {
    /// Builds a zeroed record carrying `alias`.
    #[must_use]
    pub fn new(alias: &str) -> Self {
        let mut entry = Self::new_zeroed();
        write_bounded(&mut entry.dir_alias, alias.as_bytes());
        entry.ignore_size = -1;
        entry
    }

    /// The directory alias as UTF-8, up to the first NUL.
    #[must_use]
    pub fn alias(&self) -> &str {
        read_bounded(&self.dir_alias)
    }

    /// The local work directory as UTF-8, up to the first NUL.
    #[must_use]
    pub fn work_dir(&self) -> &str {
        read_bounded(&self.retrieve_work_dir)
    }

    /// Decoded retrieve-list mode.
    #[must_use]
    pub fn mode(&self) -> StupidMode {
        StupidMode::from_raw(self.stupid_mode)
    }
}

/// Copies `src` into the fixed field `dst`, truncating and NUL-terminating.
pub fn write_bounded(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

/// Reads a NUL-terminated UTF-8 string from a fixed field.
///
/// Invalid UTF-8 yields the longest valid prefix; the tables are written by
/// this crate so that only happens after external corruption.
pub fn read_bounded(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    match std::str::from_utf8(&src[..end]) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&src[..e.valid_up_to()]).unwrap_or(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn layouts_are_padding_free_and_aligned() {
        // IntoBytes refuses implicit padding at derive time; these pin the
        // absolute sizes so a stray field edit cannot slip through review.
        assert_eq!(size_of::<FsaHeader>(), TABLE_HEADER_LEN);
        assert_eq!(size_of::<JobSlot>(), 360);
        assert_eq!(size_of::<HostEntry>(), 2064);
        assert_eq!(size_of::<DirEntry>(), 368);
        assert_eq!(size_of::<HostEntry>() % 8, 0);
        assert_eq!(size_of::<DirEntry>() % 8, 0);
    }

    #[test]
    fn feature_flag_byte_sits_at_documented_back_offset() {
        assert_eq!(
            std::mem::offset_of!(FsaHeader, feature_flags),
            TABLE_HEADER_LEN - FEATURE_FLAG_BACK_OFFSET
        );
    }

    #[test]
    fn bounded_strings_truncate_and_terminate() {
        let mut field = [0u8; 8];
        write_bounded(&mut field, b"longer-than-field");
        assert_eq!(read_bounded(&field), "longer-");

        write_bounded(&mut field, b"ok");
        assert_eq!(read_bounded(&field), "ok");
        assert_eq!(field[2], 0);
    }

    #[test]
    fn host_entry_defaults() {
        let entry = HostEntry::new("alpha", "alpha.example.net");
        assert_eq!(entry.alias(), "alpha");
        assert_eq!(entry.live_hostname(), "alpha.example.net");
        assert_eq!(entry.file_size_offset, -1);
        assert_eq!(entry.allowed_transfers, MAX_JOB_SLOTS as u32);
    }

    #[test]
    fn host_toggle_selects_failover_name() {
        let mut entry = HostEntry::new("alpha", "primary.example.net");
        write_bounded(&mut entry.real_hostname[1], b"failover.example.net");
        entry.host_toggle = 2;
        assert_eq!(entry.live_hostname(), "failover.example.net");
    }

    #[test]
    fn stupid_mode_decodes_unknown_as_no() {
        assert_eq!(StupidMode::from_raw(0), StupidMode::No);
        assert_eq!(StupidMode::from_raw(2), StupidMode::GetOnceOnly);
        assert_eq!(StupidMode::from_raw(200), StupidMode::No);
    }
}
