//! Per-thread sub-selectors.
//!
//! A sub-selector owns one contiguous slice of the poll array and the
//! three result lists its native poll fills. The main thread's
//! sub-selector covers slice 0; helper thread `i` covers the slice
//! starting at `(i + 1) * MAX_SELECTABLE_FDS`.

use parking_lot::Mutex;
use std::io;

use crate::selector::MAX_SELECTABLE_FDS;
use crate::sys::{self, FdResults};

#[derive(Debug)]
pub(crate) struct SubSelector {
    /// First poll-array slot of this sub-selector's slice.
    poll_index: usize,
    /// Result lists of the most recent poll. Filled by the owning
    /// poller, read by the main thread after the finish barrier.
    results: Mutex<FdResults>,
}

impl SubSelector {
    /// The main thread's sub-selector.
    pub(crate) fn main() -> Self {
        Self {
            poll_index: 0,
            results: Mutex::new(FdResults::default()),
        }
    }

    /// Helper thread `thread_index`'s sub-selector.
    pub(crate) fn helper(thread_index: usize) -> Self {
        Self {
            poll_index: (thread_index + 1) * MAX_SELECTABLE_FDS,
            results: Mutex::new(FdResults::default()),
        }
    }

    /// Polls this sub-selector's slice of the array at `base`.
    ///
    /// `total_channels` is the round's population snapshot; the slice
    /// length is the portion of it that falls inside this slice, capped
    /// at the per-call ceiling.
    pub(crate) fn poll(
        &self,
        base: *mut libc::pollfd,
        total_channels: usize,
        timeout_ms: i64,
    ) -> io::Result<()> {
        let nfds = MAX_SELECTABLE_FDS.min(total_channels.saturating_sub(self.poll_index));
        let mut results = self.results.lock();
        // Safety: the selector guarantees base covers total_channels
        // slots for the duration of the round, and each slice has
        // exactly one poller.
        unsafe {
            sys::poll_slice(base.add(self.poll_index), nfds, timeout_ms, &mut results)?;
        }
        Ok(())
    }

    /// Runs `f` over the result lists of the last poll.
    pub(crate) fn with_results<R>(&self, f: impl FnOnce(&FdResults) -> R) -> R {
        f(&self.results.lock())
    }
}
