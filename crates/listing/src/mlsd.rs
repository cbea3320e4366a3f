//! Parser for RFC 3659 machine listings.
//!
//! An `MLSD` response is one line per directory member, each line being a
//! semicolon-separated fact list, a single space, and the member name:
//!
//! ```text
//! modify=20240115103000;perm=rl;size=1234;type=file; data.bin
//! ```
//!
//! Fact names are case-insensitive and unknown facts are skipped. A line
//! without the space terminator, or with a name longer than the caller's
//! bound, is logged and dropped; parsing never aborts the scan.

use bitflags::bitflags;
use chrono::NaiveDateTime;
use memchr::memchr;

bitflags! {
    /// Permission facts the engine cares about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PermSet: u16 {
        /// `a`: APPE may be applied.
        const APPEND = 1 << 0;
        /// `c`: files may be created in the object.
        const CREATE = 1 << 1;
        /// `d`: the object may be deleted.
        const DELETE = 1 << 2;
        /// `e`: the object may be entered.
        const ENTER = 1 << 3;
        /// `f`: the object may be renamed.
        const RENAME = 1 << 4;
        /// `l`: the object may be listed.
        const LIST = 1 << 5;
        /// `m`: directories may be created in the object.
        const MKDIR = 1 << 6;
        /// `p`: contained objects may be purged.
        const PURGE = 1 << 7;
        /// `r`: RETR may be applied.
        const RETRIEVE = 1 << 8;
        /// `w`: STOR may be applied.
        const WRITE = 1 << 9;
    }
}

impl PermSet {
    fn from_fact(value: &str) -> Self {
        let mut set = Self::empty();
        for c in value.chars() {
            set |= match c.to_ascii_lowercase() {
                'a' => Self::APPEND,
                'c' => Self::CREATE,
                'd' => Self::DELETE,
                'e' => Self::ENTER,
                'f' => Self::RENAME,
                'l' => Self::LIST,
                'm' => Self::MKDIR,
                'p' => Self::PURGE,
                'r' => Self::RETRIEVE,
                'w' => Self::WRITE,
                _ => Self::empty(),
            };
        }
        set
    }
}

/// Object type reported by the `type` fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// A plain file; `OS.unix=slink` is folded in here.
    File,
    /// A subdirectory.
    Dir,
    /// The listed directory itself.
    CurrentDir,
    /// The parent of the listed directory.
    ParentDir,
    /// An OS-specific type the admission pipeline ignores.
    OsSpecial,
}

/// One parsed member of a machine listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlsdEntry {
    /// Member name exactly as listed.
    pub name: String,
    /// Size in bytes, -1 when the server did not report one.
    pub size: i64,
    /// Modification time as Unix seconds; meaningful only if `got_date`.
    pub mtime: i64,
    /// Whether the `modify` fact was present and well-formed.
    pub got_date: bool,
    /// Decoded `type` fact; a missing fact is treated as a plain file.
    pub entry_type: EntryType,
    /// Decoded `perm` fact, if present.
    pub perm: Option<PermSet>,
}

/// Counters describing one parse pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines that produced an entry.
    pub parsed: usize,
    /// Lines dropped as malformed or over the name bound.
    pub skipped: usize,
}

/// `modify=YYYYMMDDHHMMSS[.sss]`, interpreted as UTC.
fn parse_modify(value: &str) -> Option<i64> {
    let digits = value.split('.').next().unwrap_or(value);
    if digits.len() != 14 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

fn parse_type(value: &str) -> EntryType {
    if value.eq_ignore_ascii_case("file") {
        EntryType::File
    } else if value.eq_ignore_ascii_case("dir") {
        EntryType::Dir
    } else if value.eq_ignore_ascii_case("cdir") {
        EntryType::CurrentDir
    } else if value.eq_ignore_ascii_case("pdir") {
        EntryType::ParentDir
    } else if value.eq_ignore_ascii_case("os.unix=slink") {
        // Symlinks are fetched like plain files.
        EntryType::File
    } else {
        EntryType::OsSpecial
    }
}

fn parse_line(line: &str, max_name_len: usize) -> Option<MlsdEntry> {
    let sp = memchr(b' ', line.as_bytes())?;
    let (facts, name) = line.split_at(sp);
    let name = &name[1..];
    if name.is_empty() {
        return None;
    }
    if name.len() >= max_name_len {
        tracing::error!(len = name.len(), max = max_name_len, "listing name too long, skipping");
        return None;
    }

    let mut entry = MlsdEntry {
        name: name.to_owned(),
        size: -1,
        mtime: 0,
        got_date: false,
        entry_type: EntryType::File,
        perm: None,
    };

    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some(eq) = fact.find('=') else { continue };
        let (key, value) = (&fact[..eq], &fact[eq + 1..]);
        if key.eq_ignore_ascii_case("modify") {
            if let Some(ts) = parse_modify(value) {
                entry.mtime = ts;
                entry.got_date = true;
            }
        } else if key.eq_ignore_ascii_case("size") {
            if let Ok(size) = value.parse::<i64>() {
                entry.size = size;
            }
        } else if key.eq_ignore_ascii_case("perm") {
            entry.perm = Some(PermSet::from_fact(value));
        } else if key.eq_ignore_ascii_case("type") {
            entry.entry_type = parse_type(value);
        }
    }
    Some(entry)
}

/// Parses a full `MLSD` response body.
///
/// Returns every well-formed entry in listing order plus the counters of
/// the pass. Undecodable bytes in a line make that line malformed; the rest
/// of the response still parses.
pub fn parse_mlsd(buf: &[u8], max_name_len: usize) -> (Vec<MlsdEntry>, ParseStats) {
    let mut entries = Vec::new();
    let mut stats = ParseStats::default();

    for raw in buf.split(|&b| b == b'\n') {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            continue;
        }
        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!("listing line is not UTF-8, skipping");
            stats.skipped += 1;
            continue;
        };
        match parse_line(line, max_name_len) {
            Some(entry) => {
                entries.push(entry);
                stats.parsed += 1;
            }
            None => {
                tracing::warn!(line, "malformed listing line, skipping");
                stats.skipped += 1;
            }
        }
    }
    (entries, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME_BOUND: usize = 256;

    #[test]
    fn parses_a_full_fact_line() {
        let buf = b"modify=20240115103000;perm=rl;size=1234;type=file; data.bin\r\n";
        let (entries, stats) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(stats.parsed, 1);
        assert_eq!(stats.skipped, 0);

        let e = &entries[0];
        assert_eq!(e.name, "data.bin");
        assert_eq!(e.size, 1234);
        assert!(e.got_date);
        // 2024-01-15T10:30:00Z
        assert_eq!(e.mtime, 1_705_314_600);
        assert_eq!(e.entry_type, EntryType::File);
        let perm = e.perm.expect("perm fact");
        assert!(perm.contains(PermSet::RETRIEVE));
        assert!(perm.contains(PermSet::LIST));
        assert!(!perm.contains(PermSet::WRITE));
    }

    #[test]
    fn fact_names_are_case_insensitive() {
        let buf = b"Modify=20240115103000;SIZE=10;Type=FILE; x\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(entries[0].size, 10);
        assert!(entries[0].got_date);
        assert_eq!(entries[0].entry_type, EntryType::File);
    }

    #[test]
    fn unknown_facts_are_ignored() {
        let buf = b"unique=1abc;media-type=text/plain;size=5;type=file; y\r\n";
        let (entries, stats) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(stats.parsed, 1);
        assert_eq!(entries[0].size, 5);
    }

    #[test]
    fn unix_symlink_is_a_file_other_os_types_are_special() {
        let buf = b"type=OS.unix=slink;size=3; link\r\ntype=OS.vms=journal; j\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[1].entry_type, EntryType::OsSpecial);
    }

    #[test]
    fn directory_entries_keep_their_type() {
        let buf = b"type=cdir; .\r\ntype=pdir; ..\r\ntype=dir; sub\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(entries[0].entry_type, EntryType::CurrentDir);
        assert_eq!(entries[1].entry_type, EntryType::ParentDir);
        assert_eq!(entries[2].entry_type, EntryType::Dir);
    }

    #[test]
    fn names_with_spaces_survive() {
        let buf = b"size=1;type=file; weather report 12.txt\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(entries[0].name, "weather report 12.txt");
    }

    #[test]
    fn line_without_separator_is_skipped_not_fatal() {
        let buf = b"size=1;type=file;no-space-here\r\nsize=2;type=file; ok.bin\r\n";
        let (entries, stats) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.parsed, 1);
        assert_eq!(entries[0].name, "ok.bin");
    }

    #[test]
    fn over_long_name_is_skipped() {
        let long = "x".repeat(300);
        let buf = format!("size=1;type=file; {long}\r\n");
        let (entries, stats) = parse_mlsd(buf.as_bytes(), NAME_BOUND);
        assert!(entries.is_empty());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn fractional_modify_seconds_are_accepted() {
        let buf = b"modify=20240115103000.123;type=file; f\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert!(entries[0].got_date);
        assert_eq!(entries[0].mtime, 1_705_314_600);
    }

    #[test]
    fn bad_modify_leaves_got_date_unset() {
        let buf = b"modify=2024;type=file; f\r\nmodify=notdigits12345;type=file; g\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert!(!entries[0].got_date);
        assert!(!entries[1].got_date);
    }

    #[test]
    fn missing_size_reports_unknown() {
        let buf = b"modify=20240115103000;type=file; f\r\n";
        let (entries, _) = parse_mlsd(buf, NAME_BOUND);
        assert_eq!(entries[0].size, -1);
    }
}
