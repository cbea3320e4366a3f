//! The on-disk layout of the work area.
//!
//! Everything the engine touches lives under one root: the shared tables
//! and notification FIFOs in `fifodir/`, per-directory retrieve lists in
//! `incoming/ls_data/`, the outgoing spool in `files/outgoing/`, archives
//! and the duplicate store beside them. The directory layout IS the queue;
//! there is no separate persistent queue structure.

use std::path::{Path, PathBuf};

/// File name of the host status table.
pub const HOST_TABLE_NAME: &str = "host_table";
/// File name of the directory status table.
pub const DIR_TABLE_NAME: &str = "dir_table";
/// FIFO the scheduler sleeps on between worker wake-ups.
pub const WAKE_UP_FIFO: &str = "fd_wake_up.fifo";
/// FIFO carrying directory-error-end notifications to the receive log.
pub const RECEIVE_LOG_FIFO: &str = "receive_log.fifo";
/// FIFO of the output log collector.
pub const OUTPUT_LOG_FIFO: &str = "output_log.fifo";
/// FIFO of the delete log collector.
pub const DELETE_LOG_FIFO: &str = "delete_log.fifo";
/// FIFO of the transfer log collector.
pub const TRANSFER_LOG_FIFO: &str = "transfer_log.fifo";

/// Resolver for every path under the work-area root.
#[derive(Debug, Clone)]
pub struct WorkArea {
    root: PathBuf,
}

impl WorkArea {
    /// Wraps the work-area root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The work-area root itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of shared tables and FIFOs.
    #[must_use]
    pub fn fifodir(&self) -> PathBuf {
        self.root.join("fifodir")
    }

    /// Path of the host status table.
    #[must_use]
    pub fn host_table(&self) -> PathBuf {
        self.fifodir().join(HOST_TABLE_NAME)
    }

    /// Path of the directory status table.
    #[must_use]
    pub fn dir_table(&self) -> PathBuf {
        self.fifodir().join(DIR_TABLE_NAME)
    }

    /// Path of a named notification or log FIFO.
    #[must_use]
    pub fn fifo(&self, name: &str) -> PathBuf {
        self.fifodir().join(name)
    }

    /// Backing file of the retrieve list for `dir_alias`.
    #[must_use]
    pub fn retrieve_list(&self, dir_alias: &str) -> PathBuf {
        self.root.join("incoming").join("ls_data").join(dir_alias)
    }

    /// The outgoing job directory `unique_name`.
    #[must_use]
    pub fn outgoing(&self, unique_name: &str) -> PathBuf {
        self.root.join("files").join("outgoing").join(unique_name)
    }

    /// Archive directory for `host_alias` and `job_id`.
    #[must_use]
    pub fn archive(&self, host_alias: &str, job_id: u32) -> PathBuf {
        self.root
            .join("archive")
            .join(host_alias)
            .join(job_id.to_string())
    }

    /// Duplicate-store file of `job_id`.
    #[must_use]
    pub fn crc_store(&self, job_id: u32) -> PathBuf {
        self.root.join("crc").join(job_id.to_string())
    }

    /// Side store for duplicates kept instead of deleted.
    #[must_use]
    pub fn dup_store(&self, job_id: u32) -> PathBuf {
        self.root.join("store").join(job_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_the_root() {
        let work = WorkArea::new("/var/spool/aft");
        assert_eq!(work.host_table(), Path::new("/var/spool/aft/fifodir/host_table"));
        assert_eq!(
            work.retrieve_list("wx-charts"),
            Path::new("/var/spool/aft/incoming/ls_data/wx-charts")
        );
        assert_eq!(
            work.outgoing("65a1b2c3_4d_0"),
            Path::new("/var/spool/aft/files/outgoing/65a1b2c3_4d_0")
        );
        assert_eq!(
            work.archive("alpha", 4711),
            Path::new("/var/spool/aft/archive/alpha/4711")
        );
        assert_eq!(work.crc_store(9), Path::new("/var/spool/aft/crc/9"));
    }
}
