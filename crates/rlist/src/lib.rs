#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `rlist` is the shared catalog of remote files a retrieve directory has
//! seen: one bounded record per remote file, tracking its observed size and
//! modification time, whether it has been downloaded, and which worker slot
//! currently holds it reserved.
//!
//! The catalog is a resizable memory-mapped array shared by every worker
//! fetching from the same directory. Depending on the directory mode it is
//! either backed by a file under the incoming work area (persistent across
//! sessions) or by anonymous memory that dies with the session.
//!
//! [`check::check_list`] is the single admission/reservation entry point:
//! it locates or appends the record for a listed name, reconciles observed
//! size and mtime, applies the directory predicates and the session caps,
//! and stamps the record with the calling worker's slot, all under the
//! record's byte-range lock so concurrent workers never double-claim.
//!
//! # Invariants
//!
//! - At most one worker stamp is present in `assigned` at any time.
//! - A cap rejection leaves the session totals bit-identical and raises
//!   `more_files_in_list` instead.
//! - Growth happens in fixed steps by remapping; a failed remap is fatal to
//!   the worker because catalog safety cannot be degraded.

pub mod check;
pub mod layout;
pub mod list;

pub use check::{CheckOutcome, ReservePolicy, ScanTotals, check_list};
pub use layout::{RETRIEVE_STEP, RL_FILE_NAME_LEN, RlEntry};
pub use list::RetrieveList;

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by catalog operations.
#[derive(Debug, Error)]
pub enum RlError {
    /// The backing file could not be opened, grown, or mapped.
    #[error("cannot map retrieve list {path}: {source}")]
    Map {
        /// Path of the backing file, or the session marker for anonymous
        /// backings.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The mapped file does not contain what its header claims.
    #[error("retrieve list {path} is corrupt: {reason}")]
    Corrupt {
        /// Path of the backing file.
        path: PathBuf,
        /// Human-readable diagnosis.
        reason: &'static str,
    },

    /// A listed name exceeds the fixed record bound.
    #[error("file name of {len} bytes exceeds the record bound")]
    NameTooLong {
        /// Length of the rejected name.
        len: usize,
    },

    /// A record byte-range lock failed.
    #[error(transparent)]
    Lock(#[from] status::StatusError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RlError>;
