#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` is the seam between the worker state machines and the wire.
//! The engine never speaks FTP or SMTP itself; it drives a client that
//! implements the capability traits defined here and interprets the
//! client's replies through one shared error taxonomy.
//!
//! - [`SessionError`] distinguishes timeouts, remote reply codes, and local
//!   I/O so the state machines can branch on semantics instead of strings.
//! - [`FetchSource`] is the capability set of a retrieve client: connect,
//!   login, list, open a download at an offset, read blocks, delete.
//! - [`StoreSink`] is the capability set of a delivery client: connect,
//!   greet, open an envelope, stream a body, close with a queue receipt.
//! - [`feat`] decodes FEAT negotiation into a capability bitset, and
//!   [`smtp`] extracts the queue identifier from a delivery receipt.

pub mod client;
pub mod feat;
pub mod reply;
pub mod smtp;

pub use client::{DirMtime, Envelope, FetchSource, ListKind, StoreSink, TransferKind};
pub use feat::FeatureSet;
pub use reply::{SessionError, SessionResult};
pub use smtp::parse_queue_id;
