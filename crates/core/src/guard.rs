//! The exit guard: recovery that must run on every path out.
//!
//! The engine replaces `atexit`-style hooks with a scope guard. Cleanup
//! closures are deferred onto the guard and run last-in-first-out when the
//! guard drops: on normal return, on error unwind, and after a
//! termination signal has been turned into an early return.
//!
//! The one piece of shared state the guard owns directly is the pending
//! rename: the window between "file fully received under its hidden name"
//! and "catalog updated" must not lose data on a crash, so the download
//! loop parks the rename here and clears it once the slot is written back.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// A hidden-to-final rename the exit path must finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePending {
    /// In-flight name the bytes were written under.
    pub hidden: PathBuf,
    /// Final name visible to consumers.
    pub final_path: PathBuf,
    /// Catalog record to mark retrieved once renamed.
    pub rl_index: usize,
}

/// Shared cell carrying the pending rename between the download loop and
/// the exit guard. Workers are single-threaded, so an `Rc` suffices.
pub type SharedPending = Rc<RefCell<Option<RenamePending>>>;

/// Builds an empty pending cell.
#[must_use]
pub fn shared_pending() -> SharedPending {
    Rc::new(RefCell::new(None))
}

/// LIFO stack of cleanup closures run on drop.
#[derive(Default)]
pub struct ExitGuard {
    actions: Vec<Box<dyn FnOnce()>>,
}

impl ExitGuard {
    /// An empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defers `action` to run when the guard drops.
    pub fn defer(&mut self, action: impl FnOnce() + 'static) {
        self.actions.push(Box::new(action));
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }
}

impl std::fmt::Debug for ExitGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitGuard")
            .field("deferred", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn actions_run_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        {
            let mut guard = ExitGuard::new();
            for i in 0..3 {
                let order = Arc::clone(&order);
                guard.defer(move || order.lock().expect("lock").push(i));
            }
        }
        assert_eq!(*order.lock().expect("lock"), vec![2, 1, 0]);
    }

    #[test]
    fn actions_run_on_panic_unwind() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);
        let result = std::panic::catch_unwind(move || {
            let mut guard = ExitGuard::new();
            guard.defer(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            });
            panic!("boom");
        });
        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pending_cell_moves_between_owners() {
        let pending = shared_pending();
        let observer = Rc::clone(&pending);
        *pending.borrow_mut() = Some(RenamePending {
            hidden: PathBuf::from(".data.bin"),
            final_path: PathBuf::from("data.bin"),
            rl_index: 4,
        });
        let taken = observer.borrow_mut().take().expect("pending");
        assert_eq!(taken.rl_index, 4);
        assert!(pending.borrow().is_none());
    }
}
