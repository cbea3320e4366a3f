//! Frozen on-disk layout of the retrieve-list file.

use status::layout::{read_bounded, write_bounded};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// Version word written into the list header.
pub const RL_LAYOUT_VERSION: u32 = 2;

/// Bytes reserved in front of the first record.
pub const RL_HEADER_LEN: usize = 16;

/// Records added per growth step.
pub const RETRIEVE_STEP: usize = 50;

/// Bound on a stored file name, including the trailing NUL.
pub const RL_FILE_NAME_LEN: usize = 256;

/// Marker values for the boolean record fields.
pub const NO: u8 = 0;
/// See [`NO`].
pub const YES: u8 = 1;

/// List header: the live record count plus padding up to
/// [`RL_HEADER_LEN`].
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RlHeader {
    /// Number of live records.
    pub no_of_listed_files: i32,
    /// Layout version, compared on attach.
    pub version: u32,
    _pad: [u8; 8],
}

impl RlHeader {
    /// Builds a header for an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            no_of_listed_files: 0,
            version: RL_LAYOUT_VERSION,
            _pad: [0; 8],
        }
    }
}

impl Default for RlHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// One remote file as last observed by a scan.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RlEntry {
    /// Observed size in bytes, -1 when the server reported none.
    pub size: i64,
    /// Observed modification time as Unix seconds.
    pub file_mtime: i64,
    /// Size at the previous successful download, for append-only resumes.
    pub prev_size: i64,
    /// Remote name, NUL-terminated.
    pub file_name: [u8; RL_FILE_NAME_LEN],
    /// Whether `file_mtime` came from the server.
    pub got_date: u8,
    /// Whether the file has been downloaded and renamed into place.
    pub retrieved: u8,
    /// Scan marker: seen in the current listing.
    pub in_list: u8,
    /// 0 when free, otherwise the owning worker's slot + 1.
    pub assigned: u8,
    _pad: [u8; 4],
}

impl RlEntry {
    /// Builds a fresh record for a newly listed file.
    #[must_use]
    pub fn new(name: &str, size: i64, mtime: i64, got_date: bool) -> Self {
        let mut entry = Self::new_zeroed();
        write_bounded(&mut entry.file_name, name.as_bytes());
        entry.size = size;
        entry.file_mtime = mtime;
        entry.got_date = if got_date { YES } else { NO };
        entry
    }

    /// The stored name as UTF-8, up to the first NUL.
    #[must_use]
    pub fn name(&self) -> &str {
        read_bounded(&self.file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn layout_is_frozen() {
        assert_eq!(size_of::<RlHeader>(), RL_HEADER_LEN);
        assert_eq!(size_of::<RlEntry>(), 288);
        assert_eq!(size_of::<RlEntry>() % 8, 0);
    }

    #[test]
    fn fresh_entry_is_unclaimed() {
        let entry = RlEntry::new("data.bin", 512, 1_700_000_000, true);
        assert_eq!(entry.name(), "data.bin");
        assert_eq!(entry.size, 512);
        assert_eq!(entry.got_date, YES);
        assert_eq!(entry.retrieved, NO);
        assert_eq!(entry.assigned, 0);
        assert_eq!(entry.in_list, NO);
    }
}
