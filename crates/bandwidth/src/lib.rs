#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `bandwidth` paces a worker's data loop to the per-process rate limit of
//! its host record. The worker registers every block it moved; the limiter
//! keeps a running account of bytes against wall-clock time and sleeps the
//! difference whenever the loop runs ahead of the configured rate.
//!
//! # Invariants
//!
//! - The limiter never sleeps for less than 100 ms; shorter debts are
//!   carried into the next registration so tight loops do not degrade into
//!   context-switch churn.
//! - A limit of zero bytes per second means unlimited; [`RateLimiter::new`]
//!   refuses it so callers express "unlimited" by not constructing one.
//!
//! # Examples
//!
//! ```
//! use bandwidth::RateLimiter;
//! use std::num::NonZeroU64;
//!
//! let limit = NonZeroU64::new(512 * 1024).expect("non-zero");
//! let mut limiter = RateLimiter::new(limit);
//! limiter.register(4096);
//! ```

mod limiter;

pub use limiter::RateLimiter;
