//! Session reuse between jobs bound to the same host.
//!
//! After a batch completes, the scheduler may hand the still-connected
//! worker a follow-up job instead of paying for a fresh connect and login.
//! The gate is where the worker waits for that decision; the verdict tells
//! it which prelude steps the new job invalidates.

use bitflags::bitflags;
use aftcore::JobDescriptor;
use std::time::Duration;

bitflags! {
    /// Which prelude steps a follow-up job invalidates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValuesChanged: u8 {
        /// Credentials differ; re-login (possibly reconnect).
        const USER = 1 << 0;
        /// TLS coverage differs; renegotiate.
        const AUTH = 1 << 1;
        /// Transfer representation differs; re-select.
        const TYPE = 1 << 2;
        /// Remote directory differs; re-enter.
        const TARGET_DIR = 1 << 3;
    }
}

/// What the gate decided.
#[derive(Debug)]
pub enum BurstVerdict {
    /// A follow-up job arrived for this worker slot.
    NewJob(Box<JobDescriptor>, ValuesChanged),
    /// Scan the same source again without a new job.
    Rescan,
    /// The wait expired with work known to remain.
    TimedOut,
    /// Nothing further; quit the session.
    Quit,
}

/// The worker side of the scheduler's burst handshake.
pub trait BurstGate {
    /// Waits up to `window` for a follow-up job.
    fn wait(&mut self, window: Duration) -> BurstVerdict;
}

/// Gate that never bursts; single-job invocations and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBurst;

impl BurstGate for NoBurst {
    fn wait(&mut self, _window: Duration) -> BurstVerdict {
        BurstVerdict::Quit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_burst_always_quits() {
        let mut gate = NoBurst;
        assert!(matches!(
            gate.wait(Duration::from_secs(5)),
            BurstVerdict::Quit
        ));
    }

    #[test]
    fn changed_flags_combine() {
        let changed = ValuesChanged::USER | ValuesChanged::TARGET_DIR;
        assert!(changed.contains(ValuesChanged::USER));
        assert!(!changed.contains(ValuesChanged::TYPE));
    }
}
