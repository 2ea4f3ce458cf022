//! Helper-thread pool and the two round barriers.
//!
//! Helpers park on the [`StartLock`] between rounds. The main thread
//! publishes the round's poll snapshot and bumps the runs counter to
//! release them; each helper polls its slice, then reports at the
//! [`FinishLock`], where the first finisher (main thread included)
//! signals the wakeup pipe so every other poller's slice returns too.
//! A helper marked zombie exits at its next release instead of polling.

use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::selector::sub::SubSelector;
use crate::selector::SelectorInner;

/// Parameters of one poll round, published to helpers at release time.
///
/// The base pointer travels as an address: the raw pointer itself is
/// not sendable, and helpers rebuild it only to poll their own slice.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StartSnapshot {
    pub(crate) base_addr: usize,
    pub(crate) total_channels: usize,
    pub(crate) timeout_ms: i64,
}

#[derive(Debug)]
struct StartState {
    runs: u64,
    snapshot: StartSnapshot,
}

/// Rendezvous where helpers wait for the next round.
#[derive(Debug)]
pub(crate) struct StartLock {
    state: Mutex<StartState>,
    cond: Condvar,
}

impl StartLock {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(StartState {
                runs: 0,
                snapshot: StartSnapshot {
                    base_addr: 0,
                    total_channels: 0,
                    timeout_ms: 0,
                },
            }),
            cond: Condvar::new(),
        }
    }

    /// The current runs counter; a helper spawned now must wait for the
    /// counter to advance past this value before its first poll.
    pub(crate) fn current_runs(&self) -> u64 {
        self.state.lock().runs
    }

    /// Publishes the round snapshot and releases every parked helper.
    pub(crate) fn start_threads(&self, snapshot: StartSnapshot) {
        let mut state = self.state.lock();
        state.snapshot = snapshot;
        state.runs += 1;
        self.cond.notify_all();
    }

    /// Releases parked helpers without a new round, so zombies observe
    /// their flag and exit. Used by close.
    pub(crate) fn release_all(&self) {
        let mut state = self.state.lock();
        state.runs += 1;
        self.cond.notify_all();
    }

    /// Parks the calling helper until the runs counter advances.
    /// Returns the round snapshot, or `None` if the helper has been
    /// marked zombie and must exit.
    pub(crate) fn wait_for_start(
        &self,
        last_run: &mut u64,
        zombie: &AtomicBool,
    ) -> Option<StartSnapshot> {
        let mut state = self.state.lock();
        while state.runs == *last_run {
            self.cond.wait(&mut state);
        }
        if zombie.load(Ordering::Acquire) {
            return None;
        }
        *last_run = state.runs;
        Some(state.snapshot)
    }
}

#[derive(Debug)]
struct FinishState {
    threads_to_finish: usize,
    threads_total: usize,
    error: Option<Error>,
}

/// Rendezvous where the main thread waits for helpers to finish their
/// polls, and where one poll error per round is parked until every
/// poller has reported.
#[derive(Debug)]
pub(crate) struct FinishLock {
    state: Mutex<FinishState>,
    cond: Condvar,
}

impl FinishLock {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FinishState {
                threads_to_finish: 0,
                threads_total: 0,
                error: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Called before each round with the helper count of the round.
    pub(crate) fn reset(&self, threads: usize) {
        let mut state = self.state.lock();
        state.threads_to_finish = threads;
        state.threads_total = threads;
    }

    /// Reports one helper done with its poll. The first finisher of the
    /// round fires `wake` so the remaining polls return; the last one
    /// releases the main thread.
    pub(crate) fn thread_finished(&self, wake: impl FnOnce()) {
        let mut state = self.state.lock();
        if state.threads_to_finish == state.threads_total {
            wake();
        }
        state.threads_to_finish -= 1;
        if state.threads_to_finish == 0 {
            self.cond.notify_one();
        }
    }

    /// Blocks the main thread until every helper has reported. If none
    /// has finished yet, fires `wake` to cut the helper polls short.
    pub(crate) fn wait_for_helper_threads(&self, wake: impl FnOnce()) {
        let mut state = self.state.lock();
        if state.threads_to_finish == state.threads_total {
            wake();
        }
        while state.threads_to_finish != 0 {
            self.cond.wait(&mut state);
        }
    }

    /// Parks a poll error for the round. The first error wins; later
    /// ones from other slices are dropped.
    pub(crate) fn set_error(&self, error: Error) {
        let mut state = self.state.lock();
        if state.error.is_none() {
            state.error = Some(error);
        }
    }

    /// Takes the round's parked error, if any.
    pub(crate) fn take_error(&self) -> Option<Error> {
        self.state.lock().error.take()
    }
}

/// Handle to one helper thread.
#[derive(Debug)]
pub(crate) struct SelectThread {
    pub(crate) zombie: Arc<AtomicBool>,
    pub(crate) sub: Arc<SubSelector>,
}

impl SelectThread {
    pub(crate) fn make_zombie(&self) {
        self.zombie.store(true, Ordering::Release);
    }
}

/// Spawns helper thread `index`, parked until the runs counter advances
/// past `last_run`.
pub(crate) fn spawn_helper(
    inner: &Arc<SelectorInner>,
    index: usize,
    last_run: u64,
) -> io::Result<SelectThread> {
    let sub = Arc::new(SubSelector::helper(index));
    let zombie = Arc::new(AtomicBool::new(false));
    let handle = SelectThread {
        zombie: Arc::clone(&zombie),
        sub: Arc::clone(&sub),
    };
    let inner = Arc::clone(inner);
    std::thread::Builder::new()
        .name(format!("fanmux-helper-{index}"))
        .spawn(move || helper_loop(&inner, index, &sub, &zombie, last_run))?;
    Ok(handle)
}

fn helper_loop(
    inner: &Arc<SelectorInner>,
    index: usize,
    sub: &SubSelector,
    zombie: &AtomicBool,
    mut last_run: u64,
) {
    tracing::debug!(helper = index, "helper thread started");
    loop {
        let Some(snapshot) = inner.start_lock.wait_for_start(&mut last_run, zombie) else {
            tracing::debug!(helper = index, "helper thread exiting");
            return;
        };
        let base = snapshot.base_addr as *mut libc::pollfd;
        if let Err(e) = sub.poll(base, snapshot.total_channels, snapshot.timeout_ms) {
            inner.finish_lock.set_error(e.into());
        }
        inner.finish_lock.thread_finished(|| inner.wakeup());
    }
}
