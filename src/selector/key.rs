//! Selection keys: the token binding one channel to one selector.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::channel::Selectable;
use crate::error::{Error, ErrorKind, Result};
use crate::ops::Ops;
use crate::selector::SelectorInner;

/// Application state attachable to a key.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Token representing the registration of one channel with one
/// selector.
///
/// A key is valid from creation until it is cancelled, its channel is
/// closed, or its selector is closed; it is never revalidated. All
/// accessors other than [`channel`](Self::channel),
/// [`attach`](Self::attach) and [`attachment`](Self::attachment) fail
/// with [`ErrorKind::CancelledKey`] once the key is invalid.
pub struct SelectionKey {
    channel: Arc<dyn Selectable>,
    selector: Weak<SelectorInner>,
    /// Back-reference to this key's own allocation, so `cancel` can
    /// enqueue it without the caller handing over an `Arc`.
    self_ref: Weak<SelectionKey>,
    interest: AtomicU32,
    ready: AtomicU32,
    /// Position in the selector's channel table; -1 once deregistered.
    index: AtomicI64,
    valid: AtomicBool,
    attachment: Mutex<Option<Attachment>>,
}

impl SelectionKey {
    pub(crate) fn new(
        channel: Arc<dyn Selectable>,
        selector: Weak<SelectorInner>,
        self_ref: Weak<SelectionKey>,
    ) -> Self {
        Self {
            channel,
            selector,
            self_ref,
            interest: AtomicU32::new(0),
            ready: AtomicU32::new(0),
            index: AtomicI64::new(-1),
            valid: AtomicBool::new(true),
            attachment: Mutex::new(None),
        }
    }

    /// The channel this key represents.
    #[must_use]
    pub fn channel(&self) -> &Arc<dyn Selectable> {
        &self.channel
    }

    /// Whether this key is still valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn check_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::cancelled_key())
        }
    }

    /// Returns the interest set.
    pub fn interest_ops(&self) -> Result<Ops> {
        self.check_valid()?;
        Ok(self.raw_interest())
    }

    /// Replaces the interest set.
    ///
    /// The change is reflected in the selector's poll array immediately
    /// and observed by the kernel no later than the next select round.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::IllegalArgument`] if `ops` has bits outside the
    /// channel's valid set; [`ErrorKind::CancelledKey`] if the key is
    /// invalid; [`ErrorKind::ClosedSelector`] if the selector is gone.
    pub fn set_interest_ops(&self, ops: Ops) -> Result<()> {
        self.check_valid()?;
        if !self.channel.valid_ops().contains(ops) {
            return Err(Error::new(ErrorKind::IllegalArgument)
                .with_context("interest bits outside the channel's valid set"));
        }
        let selector = self
            .selector
            .upgrade()
            .ok_or_else(Error::closed_selector)?;
        self.interest.store(ops.bits(), Ordering::Release);
        selector.put_event_ops(self, self.channel.translate_interest(ops))
    }

    /// Returns the ready set as of the last completed select round.
    pub fn ready_ops(&self) -> Result<Ops> {
        self.check_valid()?;
        Ok(self.raw_ready())
    }

    /// True if the last round reported read readiness.
    pub fn is_readable(&self) -> Result<bool> {
        Ok(self.ready_ops()?.is_readable())
    }

    /// True if the last round reported write readiness.
    pub fn is_writable(&self) -> Result<bool> {
        Ok(self.ready_ops()?.is_writable())
    }

    /// True if the last round reported connect completion.
    pub fn is_connectable(&self) -> Result<bool> {
        Ok(self.ready_ops()?.is_connectable())
    }

    /// True if the last round reported a pending inbound connection.
    pub fn is_acceptable(&self) -> Result<bool> {
        Ok(self.ready_ops()?.is_acceptable())
    }

    /// Cancels this key. Idempotent. The key becomes invalid at once and
    /// is deregistered during the next select round's drain.
    pub fn cancel(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            if let (Some(selector), Some(me)) = (self.selector.upgrade(), self.self_ref.upgrade())
            {
                selector.enqueue_cancelled(&me);
            }
        }
    }

    /// Atomically swaps the attachment slot, returning the prior value.
    /// Works on cancelled keys.
    pub fn attach(&self, attachment: Option<Attachment>) -> Option<Attachment> {
        std::mem::replace(&mut *self.attachment.lock(), attachment)
    }

    /// Returns the current attachment. Works on cancelled keys.
    #[must_use]
    pub fn attachment(&self) -> Option<Attachment> {
        self.attachment.lock().clone()
    }

    // --- translation surface (for channel implementations) ---

    /// Interest set without a validity check; the readiness translation
    /// path reads this while the key may be concurrently cancelled.
    #[must_use]
    pub fn raw_interest(&self) -> Ops {
        Ops::from_bits(self.interest.load(Ordering::Acquire))
    }

    /// Ready set without a validity check.
    #[must_use]
    pub fn raw_ready(&self) -> Ops {
        Ops::from_bits(self.ready.load(Ordering::Acquire))
    }

    /// Stores the ready set. Only the selector's readiness translation
    /// path writes here.
    pub fn set_raw_ready(&self, ops: Ops) {
        self.ready.store(ops.bits(), Ordering::Release);
    }

    /// Position of this key in its selector's channel table, or -1 once
    /// deregistered. Diagnostic; the value can change as other keys
    /// deregister.
    #[must_use]
    pub fn index(&self) -> i64 {
        self.index.load(Ordering::Acquire)
    }

    // --- selector-internal state ---

    pub(crate) fn store_interest(&self, ops: Ops) {
        self.interest.store(ops.bits(), Ordering::Release);
    }

    pub(crate) fn set_index(&self, index: i64) {
        self.index.store(index, Ordering::Release);
    }

    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SelectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionKey")
            .field("fd", &self.channel.fd())
            .field("interest", &self.raw_interest())
            .field("ready", &self.raw_ready())
            .field("index", &self.index())
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// Identity-keyed handle used by the selector's key sets: two refs are
/// equal iff they point at the same key allocation.
#[derive(Clone)]
pub(crate) struct KeyRef(pub(crate) Arc<SelectionKey>);

impl PartialEq for KeyRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for KeyRef {}

impl std::hash::Hash for KeyRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(Arc::as_ptr(&self.0) as usize);
    }
}

impl std::fmt::Debug for KeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}
