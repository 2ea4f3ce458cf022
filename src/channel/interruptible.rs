//! Asynchronous-close and interrupt machinery for blocking channels.
//!
//! Every channel the selector can register brackets its potentially
//! blocking native calls with [`InterruptibleChannel::begin`] and
//! [`InterruptibleChannel::end`]:
//!
//! ```ignore
//! MyChannel::begin(&channel);
//! let n = read_some_bytes();        // blocking native call
//! let completed = n > 0;
//! channel.end(completed)?;
//! ```
//!
//! `begin` publishes an interruptor for the calling thread. If another
//! thread interrupts it, or the channel is closed concurrently, the
//! channel's [`impl_close_channel`](InterruptibleChannel::impl_close_channel)
//! runs, which must force the in-progress kernel call to return. `end`
//! then classifies the outcome: [`ErrorKind::ClosedByInterrupt`] for the
//! interrupted thread (interrupt status stays set),
//! [`ErrorKind::AsyncClose`] for an incomplete call on a channel that is
//! no longer open, normal return otherwise.
//!
//! Interrupt and asynchronous close are funneled through the same
//! fd-close path: it is the only mechanism that unblocks a thread stuck
//! inside the kernel.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use crate::error::{Error, ErrorKind, Result};
use crate::interrupt::{self, Interruptor};

/// Shared open/close state embedded in every interruptible channel.
#[derive(Debug)]
pub struct IoCore {
    close_lock: Mutex<()>,
    open: AtomicBool,
    interrupted: Mutex<Option<ThreadId>>,
}

impl IoCore {
    /// A fresh, open channel core.
    #[must_use]
    pub fn new() -> Self {
        Self {
            close_lock: Mutex::new(()),
            open: AtomicBool::new(true),
            interrupted: Mutex::new(None),
        }
    }
}

impl Default for IoCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fires on thread interrupt while the owning thread is blocked inside
/// the channel: closes the channel so the kernel call returns.
struct ChannelInterruptor {
    channel: Arc<dyn InterruptibleChannel>,
}

impl Interruptor for ChannelInterruptor {
    fn interrupt(&self, target: ThreadId) {
        let core = self.channel.io();
        let _guard = core.close_lock.lock();
        if !core.open.load(Ordering::Acquire) {
            return;
        }
        core.open.store(false, Ordering::Release);
        *core.interrupted.lock() = Some(target);
        // The close result is irrelevant here: the blocked call will
        // surface the condition through end().
        let _ = self.channel.impl_close_channel();
    }
}

/// Base protocol for channels whose blocking calls can be aborted by
/// asynchronous close or thread interrupt.
pub trait InterruptibleChannel: Send + Sync + 'static {
    /// The embedded open/close state.
    fn io(&self) -> &IoCore;

    /// Performs the actual work of closing the channel. Must cause any
    /// in-progress kernel I/O on this channel's descriptor to return
    /// immediately. Invoked at most once.
    fn impl_close_channel(&self) -> io::Result<()>;

    /// Whether the channel is open.
    fn is_open(&self) -> bool {
        self.io().open.load(Ordering::Acquire)
    }

    /// Closes the channel. Idempotent; `impl_close_channel` runs exactly
    /// once.
    fn close(&self) -> io::Result<()> {
        let core = self.io();
        let _guard = core.close_lock.lock();
        if !core.open.load(Ordering::Acquire) {
            return Ok(());
        }
        core.open.store(false, Ordering::Release);
        self.impl_close_channel()
    }

    /// Marks the beginning of a blocking call: publishes the interruptor
    /// for the calling thread. If the thread's interrupt status is
    /// already set, the interruptor fires synchronously.
    ///
    /// An associated function rather than a method: it needs the
    /// channel's own `Arc` to arm the interruptor.
    fn begin(this: &Arc<Self>)
    where
        Self: Sized,
    {
        let interruptor = Arc::new(ChannelInterruptor {
            channel: Arc::clone(this) as Arc<dyn InterruptibleChannel>,
        });
        interrupt::blocked_on(Some(interruptor.clone() as Arc<dyn Interruptor>));
        if interrupt::current_interrupted() {
            interruptor.interrupt(std::thread::current().id());
        }
    }

    /// Marks the end of a blocking call, classifying how it finished.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ClosedByInterrupt`] if this thread was interrupted
    /// during the call (its interrupt status remains set);
    /// [`ErrorKind::AsyncClose`] if the call did not complete and the
    /// channel is no longer open.
    fn end(&self, completed: bool) -> Result<()> {
        interrupt::blocked_on(None);
        let core = self.io();
        let interrupted = *core.interrupted.lock();
        if interrupted == Some(std::thread::current().id()) {
            return Err(Error::new(ErrorKind::ClosedByInterrupt));
        }
        if !completed && !self.is_open() {
            return Err(Error::new(ErrorKind::AsyncClose));
        }
        Ok(())
    }
}
