//! Per-thread interrupt runtime.
//!
//! The selector core needs a mechanism by which one thread can cause
//! another thread's pending blocking call to return with an error. The
//! host language offers no thread interrupt, so this module provides
//! the two pieces the protocol needs:
//!
//! - a per-thread **interrupt status** flag, set by [`interrupt`] and
//!   observed by [`current_interrupted`] / [`clear_interrupted`];
//! - a per-thread **interruptor slot**: while a thread is inside a
//!   blocking call it publishes an [`Interruptor`] via [`blocked_on`];
//!   an interrupt arriving in that window fires the interruptor, which
//!   unblocks the call (in practice by closing the descriptor the call
//!   is blocked on, or by signaling the selector's wakeup pipe).
//!
//! Threads register themselves lazily on first use and are removed from
//! the registry when they exit. Interrupting a thread that never touched
//! this runtime still records the status, so a later blocking call on
//! that thread observes it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::ThreadId;

/// Capability to abort a blocking call in progress on another thread.
///
/// Fired at most once per blocking window, with the interrupted
/// thread's id. Implementations must be safe to call from any thread
/// and must not block for long; the canonical implementation closes the
/// descriptor the target is blocked on.
pub trait Interruptor: Send + Sync {
    /// Aborts the blocking call the `target` thread is executing.
    fn interrupt(&self, target: ThreadId);
}

struct ThreadSlot {
    status: Arc<AtomicBool>,
    blocker: Option<Arc<dyn Interruptor>>,
}

fn registry() -> &'static Mutex<HashMap<ThreadId, ThreadSlot>> {
    static REGISTRY: OnceLock<Mutex<HashMap<ThreadId, ThreadSlot>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Removes the calling thread's slot when the thread exits.
struct Deregister(ThreadId);

impl Drop for Deregister {
    fn drop(&mut self) {
        registry().lock().remove(&self.0);
    }
}

thread_local! {
    static CURRENT: (Arc<AtomicBool>, Deregister) = {
        let id = std::thread::current().id();
        let status = registry()
            .lock()
            .entry(id)
            .or_insert_with(|| ThreadSlot {
                status: Arc::new(AtomicBool::new(false)),
                blocker: None,
            })
            .status
            .clone();
        (status, Deregister(id))
    };
}

fn current_status() -> Arc<AtomicBool> {
    CURRENT.with(|(status, _)| status.clone())
}

/// Returns the calling thread's interrupt status without clearing it.
#[must_use]
pub fn current_interrupted() -> bool {
    current_status().load(Ordering::Acquire)
}

/// Clears the calling thread's interrupt status, returning the prior
/// value.
pub fn clear_interrupted() -> bool {
    current_status().swap(false, Ordering::AcqRel)
}

/// Publishes (or with `None`, retracts) the calling thread's
/// interruptor for the duration of a blocking call.
pub fn blocked_on(interruptor: Option<Arc<dyn Interruptor>>) {
    let id = std::thread::current().id();
    let status = current_status();
    let mut reg = registry().lock();
    match reg.get_mut(&id) {
        Some(slot) => slot.blocker = interruptor,
        None => {
            reg.insert(
                id,
                ThreadSlot {
                    status,
                    blocker: interruptor,
                },
            );
        }
    }
}

/// Interrupts `target`: sets its status flag and, if it is currently
/// inside a blocking window, fires its published interruptor.
pub fn interrupt(target: ThreadId) {
    let blocker = {
        let mut reg = registry().lock();
        let slot = reg.entry(target).or_insert_with(|| ThreadSlot {
            status: Arc::new(AtomicBool::new(false)),
            blocker: None,
        });
        slot.status.store(true, Ordering::Release);
        slot.blocker.clone()
    };
    // Fired outside the registry lock: the interruptor may take channel
    // or selector locks of its own.
    if let Some(blocker) = blocker {
        tracing::trace!(?target, "firing interruptor for blocked thread");
        blocker.interrupt(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::sync::atomic::AtomicUsize;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    struct CountingInterruptor {
        fired: AtomicUsize,
        seen: Mutex<Option<ThreadId>>,
    }

    impl Interruptor for CountingInterruptor {
        fn interrupt(&self, target: ThreadId) {
            self.fired.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock() = Some(target);
        }
    }

    #[test]
    fn interrupt_sets_status_across_threads() {
        init_test("interrupt_sets_status_across_threads");
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let handle = std::thread::spawn(move || {
            assert!(!current_interrupted());
            tx.send(std::thread::current().id()).unwrap();
            done_rx.recv().unwrap();
            assert!(current_interrupted());
            assert!(clear_interrupted());
            assert!(!current_interrupted());
        });

        let target = rx.recv().unwrap();
        interrupt(target);
        done_tx.send(()).unwrap();
        handle.join().unwrap();
        crate::test_complete!("interrupt_sets_status_across_threads");
    }

    #[test]
    fn published_interruptor_fires_with_target_id() {
        init_test("published_interruptor_fires_with_target_id");
        let counting = Arc::new(CountingInterruptor {
            fired: AtomicUsize::new(0),
            seen: Mutex::new(None),
        });

        blocked_on(Some(counting.clone() as Arc<dyn Interruptor>));
        let me = std::thread::current().id();
        interrupt(me);

        assert_eq!(counting.fired.load(Ordering::SeqCst), 1);
        assert_eq!(*counting.seen.lock(), Some(me));

        blocked_on(None);
        interrupt(me);
        assert_eq!(counting.fired.load(Ordering::SeqCst), 1);

        clear_interrupted();
        crate::test_complete!("published_interruptor_fires_with_target_id");
    }

    #[test]
    fn interrupting_unregistered_thread_is_recorded() {
        init_test("interrupting_unregistered_thread_is_recorded");
        let (tx, rx) = std::sync::mpsc::channel();
        let (go_tx, go_rx) = std::sync::mpsc::channel();

        let handle = std::thread::spawn(move || {
            // Do not touch the interrupt runtime until signaled.
            tx.send(std::thread::current().id()).unwrap();
            go_rx.recv().unwrap();
            current_interrupted()
        });

        let target = rx.recv().unwrap();
        interrupt(target);
        go_tx.send(()).unwrap();
        assert!(handle.join().unwrap());
        crate::test_complete!("interrupting_unregistered_thread_is_recorded");
    }
}
