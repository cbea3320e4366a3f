//! Notification pipes towards the scheduler.
//!
//! Workers never talk to the scheduler directly; they poke well-known
//! FIFOs in the work area. A missing reader is never an error (the
//! scheduler may be restarting), so every notification degrades to a
//! debug-level note.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::paths::{RECEIVE_LOG_FIFO, WAKE_UP_FIFO, WorkArea};

/// Byte telling the scheduler that helper workers may start.
pub const PROC_FIN_MORE_HELPERS: u8 = b'+';
/// Byte telling the scheduler this worker is finishing.
pub const PROC_FIN_DONE: u8 = b'.';

fn poke(path: &Path, payload: &[u8]) {
    let opened = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path);
    match opened {
        Ok(mut fifo) => {
            if let Err(e) = fifo.write_all(payload) {
                tracing::debug!(path = %path.display(), error = %e, "notification write failed");
            }
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "no notification reader");
        }
    }
}

/// Wakes the scheduler after this worker cleared host errors.
pub fn wake_scheduler(work: &WorkArea) {
    poke(&work.fifo(WAKE_UP_FIFO), &[1]);
}

/// Tells the scheduler whether more helpers may run for this directory.
///
/// Sent after a scan reserved files (`start_helpers` true) and again when
/// the worker finishes.
pub fn send_proc_fin(work: &WorkArea, start_helpers: bool) {
    let payload = if start_helpers {
        PROC_FIN_MORE_HELPERS
    } else {
        PROC_FIN_DONE
    };
    poke(&work.fifo(WAKE_UP_FIFO), &[payload]);
}

/// Appends a directory-error-end notification for the receive log.
pub fn report_dir_error_end(work: &WorkArea, dir_alias: &str) {
    let line = format!("{dir_alias}\n");
    poke(&work.fifo(RECEIVE_LOG_FIFO), line.as_bytes());
}
