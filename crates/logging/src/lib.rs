#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` carries the engine's domain log streams. These are wire
//! formats consumed by the log collectors, not developer diagnostics;
//! the latter go through `tracing` and stay out of this crate.
//!
//! Three streams exist:
//!
//! - the transfer log: severity-signed text lines about session progress
//!   and failures ([`trans`]);
//! - the output log: one binary record per delivered, received, or
//!   discarded file ([`output`]);
//! - the delete log: one binary record per file removed for policy reasons
//!   ([`delete`]).
//!
//! All three append to FIFOs owned by the collector processes; see
//! [`sink::FifoSink`]. Records are written with a single `write` call so
//! that records from concurrent workers do not interleave.

pub mod delete;
pub mod output;
pub mod sink;
pub mod trans;

pub use delete::{DeleteReason, DeleteRecord};
pub use output::{OutputKind, OutputRecord};
pub use sink::FifoSink;
pub use trans::{Sign, TransLog, format_line};

use thiserror::Error;

/// Errors surfaced by the log sinks and codecs.
#[derive(Debug, Error)]
pub enum LogError {
    /// The sink could not be opened or written.
    #[error("log sink failure: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to decode.
    #[error("malformed log record: {0}")]
    Malformed(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LogError>;
