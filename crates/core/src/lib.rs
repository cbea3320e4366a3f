#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `core` holds what every worker binary needs around the actual state
//! machines: the per-invocation job descriptor, the exit-code contract with
//! the scheduler, the work-area path layout, signal flags, the scheduler
//! notification pipes, and the exit guard that runs the recovery sequence
//! on every path out of the process.
//!
//! The state machines themselves live in the `engine` crate; this crate is
//! deliberately free of protocol logic so that both worker flavours share
//! one environment contract.

pub mod context;
pub mod exit_code;
pub mod guard;
pub mod job;
pub mod paths;
pub mod sched;
pub mod signals;

pub use context::WorkerContext;
pub use exit_code::{ExitCode, HasExitCode};
pub use guard::{ExitGuard, RenamePending, SharedPending};
pub use job::{JobDescriptor, JobError, SpecialFlags, TlsAuth, UniqueName};
pub use paths::WorkArea;
