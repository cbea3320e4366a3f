//! The duplicate checker of the send path.
//!
//! Each job keeps a small store of digests of the files it already sent.
//! Before transmission every candidate is checked against the store;
//! matches are handled per the job's duplicate action. Entries age out
//! after the job's check window so recurring product names do not pile up
//! forever.

use bitflags::bitflags;
use md5::{Digest, Md5};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

bitflags! {
    /// Which properties participate in the identity digest.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DupIdentity: u8 {
        /// The file name.
        const NAME = 1 << 0;
        /// The file size.
        const SIZE = 1 << 1;
        /// The file content.
        const CONTENT = 1 << 2;
    }
}

/// What to do with a detected duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DupAction {
    /// Remove the file locally.
    Delete,
    /// Park the file in the job's side store.
    Store,
    /// Log and send anyway.
    Warn,
}

const RECORD_LEN: usize = 24; // 16 digest bytes + i64 timestamp

/// Digest of the configured identity of one file.
pub fn identity_digest(
    path: &Path,
    name: &str,
    size: i64,
    identity: DupIdentity,
) -> std::io::Result<[u8; 16]> {
    let mut hasher = Md5::new();
    if identity.contains(DupIdentity::NAME) {
        hasher.update(name.as_bytes());
    }
    if identity.contains(DupIdentity::SIZE) {
        hasher.update(size.to_le_bytes());
    }
    if identity.contains(DupIdentity::CONTENT) {
        let mut file = fs::File::open(path)?;
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hasher.finalize().into())
}

/// Checks `digest` against the store at `store_path`.
///
/// Expired records are dropped, a fresh record is appended for unseen
/// digests, and the verdict says whether the digest was already present
/// within the window.
pub fn is_duplicate(
    store_path: &Path,
    digest: [u8; 16],
    window_secs: i64,
    now: i64,
) -> std::io::Result<bool> {
    let mut records: Vec<([u8; 16], i64)> = Vec::new();
    match fs::read(store_path) {
        Ok(bytes) => {
            for chunk in bytes.chunks_exact(RECORD_LEN) {
                let mut d = [0u8; 16];
                d.copy_from_slice(&chunk[..16]);
                let mut ts = [0u8; 8];
                ts.copy_from_slice(&chunk[16..]);
                let added = i64::from_le_bytes(ts);
                if now - added <= window_secs {
                    records.push((d, added));
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let seen = records.iter().any(|(d, _)| *d == digest);
    if !seen {
        records.push((digest, now));
    }

    if let Some(parent) = store_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(store_path)?;
    for (d, added) in &records {
        out.write_all(d)?;
        out.write_all(&added.to_le_bytes())?;
    }
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn first_sighting_is_not_a_duplicate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("crc").join("7");
        let digest = [7u8; 16];
        assert!(!is_duplicate(&store, digest, 3600, NOW).expect("check"));
        assert!(is_duplicate(&store, digest, 3600, NOW + 10).expect("check"));
    }

    #[test]
    fn records_age_out_of_the_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = dir.path().join("crc").join("7");
        let digest = [9u8; 16];
        assert!(!is_duplicate(&store, digest, 60, NOW).expect("check"));
        // Beyond the window the digest was evicted and counts as new.
        assert!(!is_duplicate(&store, digest, 60, NOW + 120).expect("check"));
    }

    #[test]
    fn identity_selects_the_digested_properties() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("data.bin");
        fs::write(&file, b"payload").expect("write");

        let by_name =
            identity_digest(&file, "data.bin", 7, DupIdentity::NAME).expect("digest");
        let by_name_other =
            identity_digest(&file, "other.bin", 7, DupIdentity::NAME).expect("digest");
        assert_ne!(by_name, by_name_other);

        let by_content =
            identity_digest(&file, "data.bin", 7, DupIdentity::CONTENT).expect("digest");
        let renamed =
            identity_digest(&file, "other.bin", 7, DupIdentity::CONTENT).expect("digest");
        assert_eq!(by_content, renamed);

        let with_size = identity_digest(
            &file,
            "data.bin",
            7,
            DupIdentity::NAME | DupIdentity::SIZE,
        )
        .expect("digest");
        assert_ne!(with_size, by_name);
    }
}
