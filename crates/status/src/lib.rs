#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `status` maps the two shared status tables that every transfer worker
//! attaches to: the host table (one record per remote host, carrying the
//! per-connection job slots and the aggregate transfer counters) and the
//! directory table (one record per watched remote directory, carrying the
//! retrieve policy and the scan bookkeeping).
//!
//! Both tables are plain files mapped with [`memmap2`] and shared between
//! many short-lived worker processes plus the scheduler that owns them. The
//! record layouts are frozen `#[repr(C)]` structs viewed through
//! [`zerocopy`], so nothing in this crate does pointer arithmetic by hand.
//!
//! # Concurrency
//!
//! Cross-process mutual exclusion uses advisory byte-range `fcntl` locks.
//! Each record reserves one lock byte per lock class (connection state,
//! aggregate totals, error counters, status bits); writers take the class
//! lock for the record they touch and release it on scope exit. See
//! [`lock::LockClass`] and the `with_*_locked` helpers on [`Fsa`] and
//! [`Fra`].
//!
//! # Invariants
//!
//! - Aggregate totals never go negative: an update that would undershoot is
//!   clamped to zero and the inconsistency is logged.
//! - `total_file_counter == 0` implies `total_file_size == 0`; the clamp
//!   helper repairs a drifted size when the counter reaches zero.
//! - A job slot is written only by the worker whose job number equals the
//!   slot index.

pub mod flags;
pub mod fra;
pub mod fsa;
pub mod layout;
pub mod lock;

pub use flags::{
    DeletePolicy, DirFlags, DirOptions, FeatureFlags, HostStatus, ProtocolOptions, SelectorSet,
};
pub use fra::Fra;
pub use fsa::Fsa;
pub use layout::{DirEntry, FsaHeader, HostEntry, JobSlot, StupidMode};
pub use lock::{LockClass, RegionGuard};

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while attaching to or mutating a mapped status table.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The backing file could not be opened or mapped.
    #[error("cannot map status table {path}: {source}")]
    Map {
        /// Path of the backing file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The mapped file is shorter than its own header claims.
    #[error("status table {path} is truncated ({actual} bytes, need {expected})")]
    Truncated {
        /// Path of the backing file.
        path: PathBuf,
        /// Bytes present.
        actual: usize,
        /// Bytes required by the header.
        expected: usize,
    },

    /// The version word does not match this build's layout.
    #[error("status table {path} has layout version {found}, expected {expected}")]
    Version {
        /// Path of the backing file.
        path: PathBuf,
        /// Version found in the header.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// A record index beyond the mapped count was requested.
    #[error("record index {index} out of range (table holds {count})")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of mapped records.
        count: usize,
    },

    /// A byte-range lock could not be acquired or released.
    #[error("byte-range lock failed: {0}")]
    Lock(std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StatusError>;
