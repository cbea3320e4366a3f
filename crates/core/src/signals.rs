//! Signal handling for the worker processes.
//!
//! Handlers only set flags or stamp one pre-registered byte; all real
//! cleanup runs in normal scope teardown via [`crate::ExitGuard`]. The
//! worker loops poll [`killed`] at their suspension points and unwind with
//! the kill exit code.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use status::layout::CONNECT_FAULTY;

static TERMINATED: AtomicBool = AtomicBool::new(false);
static FAULT_STAMP: AtomicPtr<u8> = AtomicPtr::new(std::ptr::null_mut());

extern "C" fn on_terminate(_: libc::c_int) {
    TERMINATED.store(true, Ordering::SeqCst);
}

extern "C" fn on_fault(signum: libc::c_int) {
    // Async-signal-safe: one byte store into the mapped slot, then fall
    // back to the default action for the core dump.
    let slot = FAULT_STAMP.load(Ordering::SeqCst);
    if !slot.is_null() {
        // SAFETY: the pointer targets the connect_status byte of this
        // worker's own job slot inside a mapping that outlives the process.
        unsafe { slot.write_volatile(CONNECT_FAULTY) };
    }
    // SAFETY: re-raising with the default disposition is the documented
    // way to terminate with the original signal semantics.
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

/// Installs the worker signal dispositions.
///
/// SIGTERM and SIGINT request termination, SIGHUP and SIGPIPE are ignored
/// (pipe breakage surfaces as write errors), SIGSEGV and SIGBUS stamp the
/// job slot faulty and re-raise for the core dump.
pub fn install() -> nix::Result<()> {
    let term = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    let fault = SigAction::new(
        SigHandler::Handler(on_fault),
        SaFlags::empty(),
        SigSet::empty(),
    );

    // SAFETY: the handlers above only touch atomics and async-signal-safe
    // libc calls.
    unsafe {
        sigaction(Signal::SIGTERM, &term)?;
        sigaction(Signal::SIGINT, &term)?;
        sigaction(Signal::SIGHUP, &ignore)?;
        sigaction(Signal::SIGPIPE, &ignore)?;
        sigaction(Signal::SIGSEGV, &fault)?;
        sigaction(Signal::SIGBUS, &fault)?;
    }
    Ok(())
}

/// Whether a termination signal arrived.
#[must_use]
pub fn killed() -> bool {
    TERMINATED.load(Ordering::SeqCst)
}

/// Clears the termination flag; test support.
pub fn reset_killed() {
    TERMINATED.store(false, Ordering::SeqCst);
}

/// Registers the byte the fault handler stamps before aborting.
///
/// Workers point this at the `connect_status` byte of their own job slot
/// so monitors can tell a crashed slot from an idle one.
pub fn register_fault_stamp(slot_status_byte: *mut u8) {
    FAULT_STAMP.store(slot_status_byte, Ordering::SeqCst);
}

/// Forgets the registered fault stamp, part of detaching from the tables.
pub fn clear_fault_stamp() {
    FAULT_STAMP.store(std::ptr::null_mut(), Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_flag_toggles() {
        reset_killed();
        assert!(!killed());
        TERMINATED.store(true, Ordering::SeqCst);
        assert!(killed());
        reset_killed();
        assert!(!killed());
    }

    #[test]
    fn fault_stamp_registration_round_trips() {
        let mut byte: u8 = 0;
        register_fault_stamp(&mut byte);
        assert_eq!(FAULT_STAMP.load(Ordering::SeqCst), &raw mut byte);
        clear_fault_stamp();
        assert!(FAULT_STAMP.load(Ordering::SeqCst).is_null());
    }
}
