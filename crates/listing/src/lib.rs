#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `listing` turns a raw machine-listing response from a remote server into
//! admission decisions. It has two halves:
//!
//! - [`mlsd`] parses the fact lines of an `MLSD` response into
//!   [`MlsdEntry`] records, tolerating unknown facts and skipping malformed
//!   lines without aborting the scan.
//! - [`admission`] applies the directory's file masks, size and age
//!   predicates, and the unknown-file deletion policy to each record,
//!   producing one of fetch / delete-remote / ignore.
//!
//! Reservation of an admitted file in the shared retrieve list is the
//! caller's business: [`admission::consider`] takes a closure so this crate
//! never needs to know about the list's locking.

pub mod admission;
pub mod mlsd;

pub use admission::{
    AdmissionPolicy, DEFAULT_TRANSFER_TIMEOUT, FileMask, MaskMatch, Predicates, Verdict, consider,
};
pub use mlsd::{EntryType, MlsdEntry, PermSet, parse_mlsd};
