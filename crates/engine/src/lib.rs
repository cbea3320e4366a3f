#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` drives one transfer session end to end. Two state machines
//! live here, one per worker flavour:
//!
//! - [`fetch`] pulls files from a watched remote directory into the local
//!   incoming area: connect, list, admit, reserve in the shared catalog,
//!   download with offset resume, optionally delete remotely, rename into
//!   place, account into the shared tables.
//! - [`send`] pushes the files of one outgoing job directory to a mail
//!   gateway: enumerate, age-filter, duplicate-check, frame as MIME,
//!   transmit, archive or unlink, account, remove the job directory.
//!
//! Both machines are protocol-parameterized over the capability traits in
//! the `protocol` crate and can be re-entered through a burst gate to
//! process follow-up jobs on the same connection ([`burst`]).
//!
//! The supporting modules carry the send path's MIME framing ([`mail`]),
//! the duplicate checker ([`dup`]), archival ([`archive`]), and the
//! session summary line ([`summary`]).

pub mod archive;
pub mod burst;
pub mod dup;
pub mod error;
pub mod fetch;
pub mod mail;
pub mod send;
pub mod summary;

pub use burst::{BurstGate, BurstVerdict, NoBurst, ValuesChanged};
pub use error::{Step, WorkerError};
pub use fetch::{FetchOutcome, FetchWorker, WorkerLogs};
pub use send::{DupConfig, SendOutcome, SendWorker};
