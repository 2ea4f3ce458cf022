//! The multiplexer engine.
//!
//! One [`Selector`] coordinates many non-blocking channels over an
//! array-based, level-triggered, capacity-bounded poll primitive. The
//! poll array is laid out in slices of [`MAX_SELECTABLE_FDS`] slots;
//! slice 0 belongs to the thread calling `select`, every further slice
//! to one helper thread. Slot 0 of each slice is a sticky sentinel
//! carrying the wakeup pipe's read end, so a single one-byte write
//! returns every poller of the round.
//!
//! A select round:
//!
//! 1. drain the cancelled-key queue,
//! 2. return immediately if a wakeup is already pending,
//! 3. adjust the helper pool to the current population,
//! 4. publish the round snapshot and release the helpers,
//! 5. poll slice 0 on the calling thread, bracketed by the selector's
//!    interruptor so a thread interrupt turns into a wakeup,
//! 6. wait for the helpers at the finish barrier (the first finisher
//!    wakes the rest),
//! 7. surface one deferred poll error, if any slice produced one,
//! 8. drain cancelled keys again, merge the per-slice result lists into
//!    the selected-key set, reset the wakeup pipe, and return the number
//!    of keys whose ready set changed.
//!
//! Lock order, outermost first: `select_lock` → `keys` → `selected` →
//! `cancelled` → `state` (the close lock; owns the poll array) →
//! `fd_map` → `threads` → `wakeup` (leaf). The wakeup flag lock is never
//! held across another acquisition.

mod fd_map;
mod key;
mod pool;
mod sub;

pub use key::{Attachment, SelectionKey};

pub(crate) use key::KeyRef;

use parking_lot::Mutex;
use std::collections::HashSet;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use crate::channel::{ChannelKind, Selectable};
use crate::error::{Error, ErrorKind, Result};
use crate::interrupt::{self, Interruptor};
use crate::ops::Ops;
use crate::poll_array::PollArray;
use crate::sys::{self, event, FdResults, WakeupPipe};

use fd_map::FdMap;
use pool::{FinishLock, SelectThread, StartLock, StartSnapshot};
use sub::SubSelector;

/// Per-helper ceiling of the underlying poll call. Also the slice width
/// of the poll array; a protocol constant, not a tunable.
pub const MAX_SELECTABLE_FDS: usize = 1024;

/// Initial poll-array capacity.
const INIT_CAP: usize = 8;

/// Everything owned by the close lock. `None` in the containing mutex
/// means the selector is closed.
struct PollState {
    array: PollArray,
    /// Allocations retired by grow, parked until close so a poller
    /// mid-call on an old buffer never reads freed memory.
    retired: Vec<PollArray>,
    /// Key per poll-array slot; `None` at wakeup sentinel positions.
    table: Vec<Option<Arc<SelectionKey>>>,
    /// Valid slots, wakeup sentinels included.
    total_channels: usize,
    /// Helper threads the current population requires.
    helper_count: usize,
    /// Owns the wakeup pipe descriptors; dropped at close.
    #[allow(dead_code)]
    pipe: WakeupPipe,
}

#[derive(Debug, Default)]
struct WakeupFlag {
    triggered: bool,
}

/// Configures and opens a [`Selector`].
#[derive(Debug, Clone)]
pub struct SelectorBuilder {
    initial_capacity: usize,
}

impl SelectorBuilder {
    /// A builder with the default initial capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_capacity: INIT_CAP,
        }
    }

    /// Initial poll-array capacity in slots. Grows on demand in powers
    /// of two; values below 2 are raised to 2.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity.max(2);
        self
    }

    /// Opens a selector with this configuration.
    pub fn open(self) -> Result<Selector> {
        let pipe = WakeupPipe::new().map_err(Error::from)?;
        let wakeup_source_fd = pipe.source_fd();
        let wakeup_sink_fd = pipe.sink_fd();

        let capacity = self.initial_capacity;
        let mut array = PollArray::with_capacity(capacity);
        array.add_wakeup_entry(0, wakeup_source_fd);
        let mut table = Vec::with_capacity(capacity);
        table.resize_with(capacity, || None);

        let inner = Arc::new(SelectorInner {
            select_lock: Mutex::new(()),
            keys: Mutex::new(HashSet::new()),
            selected: Mutex::new(HashSet::new()),
            cancelled: Mutex::new(HashSet::new()),
            state: Mutex::new(Some(PollState {
                array,
                retired: Vec::new(),
                table,
                total_channels: 1,
                helper_count: 0,
                pipe,
            })),
            fd_map: Mutex::new(FdMap::default()),
            threads: Mutex::new(Vec::new()),
            start_lock: StartLock::new(),
            finish_lock: FinishLock::new(),
            main_sub: SubSelector::main(),
            wakeup: Mutex::new(WakeupFlag::default()),
            wakeup_source_fd,
            wakeup_sink_fd,
            update_count: AtomicU64::new(0),
            open: AtomicBool::new(true),
        });
        tracing::debug!(capacity, "selector opened");
        Ok(Selector { inner })
    }
}

impl Default for SelectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A readiness multiplexer over many non-blocking channels.
///
/// Externally it behaves as a single-threaded readiness selector; past
/// [`MAX_SELECTABLE_FDS`] registrations it transparently fans the poll
/// out across helper threads and merges their results.
///
/// Dropping a selector closes it.
pub struct Selector {
    inner: Arc<SelectorInner>,
}

impl Selector {
    /// Opens a selector with default configuration.
    pub fn open() -> Result<Self> {
        SelectorBuilder::new().open()
    }

    /// Returns a builder for non-default configuration.
    #[must_use]
    pub fn builder() -> SelectorBuilder {
        SelectorBuilder::new()
    }

    /// Whether the selector is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Registers a channel, returning its selection key.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::ClosedChannel`] if the channel is not open,
    /// [`ErrorKind::IllegalArgument`] if `ops` has bits outside the
    /// channel's valid set, [`ErrorKind::ClosedSelector`] after close.
    pub fn register(
        &self,
        channel: Arc<dyn Selectable>,
        ops: Ops,
        attachment: Option<Attachment>,
    ) -> Result<Arc<SelectionKey>> {
        SelectorInner::register(&self.inner, channel, ops, attachment)
    }

    /// Blocks until at least one registered channel becomes ready, the
    /// selector is woken, or the calling thread is interrupted. Returns
    /// the number of keys whose ready set changed.
    pub fn select(&self) -> Result<usize> {
        SelectorInner::do_select(&self.inner, -1)
    }

    /// Like [`select`](Self::select), bounded by `timeout_ms`
    /// milliseconds. A timeout of 0 means block indefinitely.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::IllegalArgument`] for a negative timeout.
    pub fn select_millis(&self, timeout_ms: i64) -> Result<usize> {
        if timeout_ms < 0 {
            return Err(
                Error::new(ErrorKind::IllegalArgument).with_context("negative select timeout")
            );
        }
        let timeout = if timeout_ms == 0 { -1 } else { timeout_ms };
        SelectorInner::do_select(&self.inner, timeout)
    }

    /// Non-blocking select: one poll round that returns immediately.
    pub fn select_now(&self) -> Result<usize> {
        SelectorInner::do_select(&self.inner, 0)
    }

    /// Makes the next (or current) blocking select return immediately.
    /// Idempotent within a round; usable after close.
    pub fn wakeup(&self) -> &Self {
        self.inner.wakeup();
        self
    }

    /// Closes the selector: deregisters every key, releases the poll
    /// array and wakeup pipe, and retires all helper threads.
    /// Idempotent.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Snapshot of all currently registered keys.
    #[must_use]
    pub fn keys(&self) -> Vec<Arc<SelectionKey>> {
        self.inner
            .keys
            .lock()
            .iter()
            .map(|k| Arc::clone(&k.0))
            .collect()
    }

    /// Snapshot of the selected-key set.
    ///
    /// Keys enter this set only through select rounds; the application
    /// may remove them with [`remove_selected`](Self::remove_selected)
    /// or [`clear_selected`](Self::clear_selected) but cannot add.
    #[must_use]
    pub fn selected_keys(&self) -> Vec<Arc<SelectionKey>> {
        self.inner
            .selected
            .lock()
            .iter()
            .map(|k| Arc::clone(&k.0))
            .collect()
    }

    /// Removes one key from the selected-key set. Returns whether it
    /// was present.
    pub fn remove_selected(&self, key: &Arc<SelectionKey>) -> bool {
        self.inner.selected.lock().remove(&KeyRef(Arc::clone(key)))
    }

    /// Empties the selected-key set.
    pub fn clear_selected(&self) {
        self.inner.selected.lock().clear();
    }

    /// Number of currently registered keys.
    #[must_use]
    pub fn registered_count(&self) -> usize {
        self.inner.keys.lock().len()
    }

    /// Helper threads the current population requires.
    #[must_use]
    pub fn helper_count(&self) -> usize {
        self.inner
            .state
            .lock()
            .as_ref()
            .map_or(0, |st| st.helper_count)
    }

    /// Helper threads currently alive (adjusted at each select round).
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.inner.threads.lock().len()
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            tracing::debug!(error = %e, "close on drop failed");
        }
    }
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector")
            .field("open", &self.is_open())
            .field("registered", &self.registered_count())
            .field("helpers", &self.helper_count())
            .finish_non_exhaustive()
    }
}

/// Fires when a thread blocked in `select` is interrupted: converts the
/// interrupt into a selector wakeup.
struct SelectInterruptor {
    inner: Weak<SelectorInner>,
}

impl Interruptor for SelectInterruptor {
    fn interrupt(&self, _target: ThreadId) {
        if let Some(inner) = self.inner.upgrade() {
            inner.wakeup();
        }
    }
}

pub(crate) struct SelectorInner {
    /// Serializes select rounds; close also takes it to wait out an
    /// in-flight round before freeing the poll array.
    select_lock: Mutex<()>,
    keys: Mutex<HashSet<KeyRef>>,
    selected: Mutex<HashSet<KeyRef>>,
    cancelled: Mutex<HashSet<KeyRef>>,
    /// The close lock. `None` once closed.
    state: Mutex<Option<PollState>>,
    fd_map: Mutex<FdMap>,
    threads: Mutex<Vec<SelectThread>>,
    pub(crate) start_lock: StartLock,
    pub(crate) finish_lock: FinishLock,
    main_sub: SubSelector,
    /// The interrupt lock: guards the wakeup-pending flag.
    wakeup: Mutex<WakeupFlag>,
    wakeup_source_fd: RawFd,
    wakeup_sink_fd: RawFd,
    update_count: AtomicU64,
    open: AtomicBool,
}

impl SelectorInner {
    /// Associated-function style throughout this impl: operations that
    /// hand out `Weak` back-references or spawn helper threads need the
    /// selector's own `Arc`.
    fn register(
        this: &Arc<Self>,
        channel: Arc<dyn Selectable>,
        ops: Ops,
        attachment: Option<Attachment>,
    ) -> Result<Arc<SelectionKey>> {
        if !channel.is_open() {
            return Err(Error::closed_channel());
        }
        if !channel.valid_ops().contains(ops) {
            return Err(Error::new(ErrorKind::IllegalArgument)
                .with_context("interest bits outside the channel's valid set"));
        }

        let key = Arc::new_cyclic(|self_ref| {
            SelectionKey::new(
                Arc::clone(&channel),
                Arc::downgrade(this),
                self_ref.clone(),
            )
        });
        if attachment.is_some() {
            key.attach(attachment);
        }

        let mut keys = this.keys.lock();
        {
            let mut guard = this.state.lock();
            let st = guard.as_mut().ok_or_else(Error::closed_selector)?;
            Self::grow_if_needed(st, this.wakeup_source_fd);

            let index = st.total_channels;
            st.table[index] = Some(Arc::clone(&key));
            key.set_index(index as i64);
            this.fd_map.lock().insert(&key);
            st.array.add_entry(index, channel.fd());
            st.total_channels += 1;

            key.store_interest(ops);
            st.array
                .put_event_ops(index, channel.translate_interest(ops));
            tracing::trace!(fd = channel.fd(), index, ?ops, "registered channel");
        }
        keys.insert(KeyRef(Arc::clone(&key)));
        Ok(key)
    }

    /// Doubles the table when full; opens a new helper slice when the
    /// population reaches a slice boundary. Caller holds the close lock.
    fn grow_if_needed(st: &mut PollState, wakeup_source_fd: RawFd) {
        if st.table.len() == st.total_channels {
            let new_capacity = st.total_channels * 2;
            st.table.resize_with(new_capacity, || None);
            let retired = st.array.grow(new_capacity);
            st.retired.push(retired);
            tracing::debug!(capacity = new_capacity, "poll array grown");
        }
        if st.total_channels % MAX_SELECTABLE_FDS == 0 {
            st.array
                .add_wakeup_entry(st.total_channels, wakeup_source_fd);
            st.table[st.total_channels] = None;
            st.total_channels += 1;
            st.helper_count += 1;
            tracing::debug!(
                helpers = st.helper_count,
                total = st.total_channels,
                "opened helper slice"
            );
        }
    }

    pub(crate) fn enqueue_cancelled(&self, key: &Arc<SelectionKey>) {
        self.cancelled.lock().insert(KeyRef(Arc::clone(key)));
    }

    /// Pushes an interest update into the poll array.
    pub(crate) fn put_event_ops(&self, key: &SelectionKey, events: i16) -> Result<()> {
        let guard = self.state.lock();
        let st = guard.as_ref().ok_or_else(Error::closed_selector)?;
        let index = key.index();
        if index < 0 {
            return Err(Error::cancelled_key());
        }
        st.array.put_event_ops(index as usize, events);
        Ok(())
    }

    /// Drains the cancelled-key queue, deregistering each key.
    fn process_deregister_queue(&self) {
        let mut keys = self.keys.lock();
        let mut selected = self.selected.lock();
        let drained: Vec<KeyRef> = {
            let mut cancelled = self.cancelled.lock();
            if cancelled.is_empty() {
                return;
            }
            cancelled.drain().collect()
        };
        for key in &drained {
            self.impl_dereg(&key.0, &mut keys, &mut selected);
        }
    }

    /// Removes one key from the channel table, poll array, fd map and
    /// key sets. Caller holds `keys` and `selected`.
    fn impl_dereg(
        &self,
        key: &Arc<SelectionKey>,
        keys: &mut HashSet<KeyRef>,
        selected: &mut HashSet<KeyRef>,
    ) {
        {
            let mut guard = self.state.lock();
            if let Some(st) = guard.as_mut() {
                let index = key.index();
                if index >= 0 {
                    let i = index as usize;
                    let last = st.total_channels - 1;
                    if i != last {
                        // Move the tail entry into the vacated slot.
                        let moved = st.table[last].take();
                        if let Some(moved) = moved {
                            moved.set_index(i as i64);
                            st.array.replace_entry(last, i);
                            st.table[i] = Some(moved);
                        }
                    } else {
                        st.table[last] = None;
                    }
                    key.set_index(-1);
                    st.array.clear_entry(last);
                    st.total_channels -= 1;

                    // A slice left holding only its sentinel is retired.
                    if st.total_channels != 1 && st.total_channels % MAX_SELECTABLE_FDS == 1 {
                        st.total_channels -= 1;
                        st.array.clear_entry(st.total_channels);
                        st.helper_count -= 1;
                        tracing::debug!(helpers = st.helper_count, "retired helper slice");
                    }
                    tracing::trace!(fd = key.channel().fd(), index = i, "deregistered channel");
                }
            }
        }
        self.fd_map.lock().remove(key);
        keys.remove(&KeyRef(Arc::clone(key)));
        selected.remove(&KeyRef(Arc::clone(key)));

        let channel = key.channel();
        if !channel.is_open() && !channel.is_registered() {
            if let Err(e) = channel.kill() {
                tracing::debug!(fd = channel.fd(), error = %e, "channel kill failed");
            }
        }
    }

    /// Spawns or retires helpers to match the required count. Surplus
    /// helpers are marked zombie and exit at the next release.
    fn adjust_thread_count(this: &Arc<Self>) -> Result<()> {
        let helper_count = {
            let guard = this.state.lock();
            guard.as_ref().ok_or_else(Error::closed_selector)?.helper_count
        };
        let mut threads = this.threads.lock();
        if helper_count > threads.len() {
            let last_run = this.start_lock.current_runs();
            for index in threads.len()..helper_count {
                let thread = pool::spawn_helper(this, index, last_run).map_err(Error::from)?;
                threads.push(thread);
            }
        } else {
            while threads.len() > helper_count {
                if let Some(thread) = threads.pop() {
                    thread.make_zombie();
                }
            }
        }
        Ok(())
    }

    fn do_select(this: &Arc<Self>, timeout_ms: i64) -> Result<usize> {
        let _round = this.select_lock.lock();
        if this.state.lock().is_none() {
            return Err(Error::closed_selector());
        }

        this.process_deregister_queue();

        // A wakeup that landed before this round short-circuits it.
        {
            let mut wakeup = this.wakeup.lock();
            if wakeup.triggered {
                let _ = sys::reset_wakeup_socket(this.wakeup_source_fd);
                wakeup.triggered = false;
                return Ok(0);
            }
        }

        Self::adjust_thread_count(this)?;

        let (base_addr, total_channels) = {
            let guard = this.state.lock();
            let st = guard.as_ref().ok_or_else(Error::closed_selector)?;
            (st.array.base_ptr() as usize, st.total_channels)
        };

        let helper_threads = this.threads.lock().len();
        this.finish_lock.reset(helper_threads);
        this.start_lock.start_threads(StartSnapshot {
            base_addr,
            total_channels,
            timeout_ms,
        });

        Self::begin_select(this);
        let poll_result = this.main_sub.poll(
            base_addr as *mut libc::pollfd,
            total_channels,
            timeout_ms,
        );
        if let Err(e) = poll_result {
            this.finish_lock.set_error(e.into());
        }
        if helper_threads > 0 {
            this.finish_lock.wait_for_helper_threads(|| this.wakeup());
        }
        this.end_select();

        if let Some(error) = this.finish_lock.take_error() {
            return Err(error.with_context("poll failed during select round"));
        }

        this.process_deregister_queue();
        let updated = this.update_selected_keys();
        this.reset_wakeup_socket();
        tracing::trace!(updated, total_channels, "select round complete");
        Ok(updated)
    }

    /// Brackets the blocking poll: an interrupt of this thread becomes a
    /// selector wakeup. A pending interrupt converts immediately.
    fn begin_select(this: &Arc<Self>) {
        let interruptor = Arc::new(SelectInterruptor {
            inner: Arc::downgrade(this),
        });
        interrupt::blocked_on(Some(interruptor as Arc<dyn Interruptor>));
        if interrupt::current_interrupted() {
            this.wakeup();
        }
    }

    fn end_select(&self) {
        interrupt::blocked_on(None);
    }

    /// Merges every sub-selector's result lists into the selected-key
    /// set. Returns the number of keys whose ready set changed.
    fn update_selected_keys(&self) -> usize {
        let update_count = self.update_count.fetch_add(1, Ordering::AcqRel) + 1;
        let mut selected = self.selected.lock();
        let mut fd_map = self.fd_map.lock();

        let mut updated =
            self.process_selected_keys(update_count, &self.main_sub, &mut selected, &mut fd_map);
        let threads = self.threads.lock();
        for thread in threads.iter() {
            updated +=
                self.process_selected_keys(update_count, &thread.sub, &mut selected, &mut fd_map);
        }
        updated
    }

    fn process_selected_keys(
        &self,
        update_count: u64,
        sub: &SubSelector,
        selected: &mut HashSet<KeyRef>,
        fd_map: &mut FdMap,
    ) -> usize {
        sub.with_results(|results: &FdResults| {
            let mut updated = 0;
            updated += self.process_fd_set(
                update_count,
                &results.read,
                event::POLLIN,
                false,
                selected,
                fd_map,
            );
            updated += self.process_fd_set(
                update_count,
                &results.write,
                event::POLLCONN | event::POLLOUT,
                false,
                selected,
                fd_map,
            );
            updated += self.process_fd_set(
                update_count,
                &results.except,
                event::POLLIN | event::POLLCONN | event::POLLOUT,
                true,
                selected,
                fd_map,
            );
            updated
        })
    }

    /// Folds one result list into the selected-key set.
    ///
    /// Within a round, the first list that touches a key establishes its
    /// ready set (set-semantics); later lists merge into it
    /// (update-semantics). `cleared_count` tracks the former,
    /// `update_count` makes each key count at most once per round even
    /// when it surfaces in several lists.
    fn process_fd_set(
        &self,
        update_count: u64,
        fds: &[RawFd],
        r_ops: i16,
        is_except: bool,
        selected: &mut HashSet<KeyRef>,
        fd_map: &mut FdMap,
    ) -> usize {
        let mut updated = 0;
        for &fd in fds {
            if fd == self.wakeup_source_fd {
                self.wakeup.lock().triggered = true;
                continue;
            }
            // Absent entry: the key was deregistered by this round's
            // earlier drain.
            let Some(entry) = fd_map.get_mut(fd) else {
                continue;
            };
            let key = Arc::clone(&entry.key);
            let channel = key.channel();

            // Urgent data may be the only reason the descriptor sits in
            // the exception list; discard it and surface nothing.
            if is_except
                && channel.kind() == ChannelKind::TcpStream
                && sys::discard_urgent_data(fd)
            {
                continue;
            }

            if selected.contains(&KeyRef(Arc::clone(&key))) {
                let changed = if entry.cleared_count != update_count {
                    channel.translate_and_set_ready(r_ops, &key)
                } else {
                    channel.translate_and_update_ready(r_ops, &key)
                };
                if changed && entry.update_count != update_count {
                    entry.update_count = update_count;
                    updated += 1;
                }
            } else {
                if entry.cleared_count != update_count {
                    channel.translate_and_set_ready(r_ops, &key);
                } else {
                    channel.translate_and_update_ready(r_ops, &key);
                }
                if key.raw_ready().intersects(key.raw_interest()) {
                    selected.insert(KeyRef(Arc::clone(&key)));
                    entry.update_count = update_count;
                    updated += 1;
                }
            }
            entry.cleared_count = update_count;
        }
        updated
    }

    /// Signals the wakeup pipe unless a wakeup is already pending.
    pub(crate) fn wakeup(&self) {
        let mut wakeup = self.wakeup.lock();
        if !wakeup.triggered {
            if let Err(e) = sys::set_wakeup_socket(self.wakeup_sink_fd) {
                tracing::warn!(error = %e, "failed to signal wakeup pipe");
            }
            wakeup.triggered = true;
        }
    }

    /// Drains the wakeup pipe and clears the pending flag.
    fn reset_wakeup_socket(&self) {
        let mut wakeup = self.wakeup.lock();
        if wakeup.triggered {
            let _ = sys::reset_wakeup_socket(self.wakeup_source_fd);
            wakeup.triggered = false;
        }
    }

    fn close(&self) -> Result<()> {
        // Unblock an in-flight round, then wait it out so nothing is
        // still polling the array we are about to free.
        self.wakeup();
        let _round = self.select_lock.lock();

        let mut keys = self.keys.lock();
        let mut selected = self.selected.lock();
        let mut cancelled = self.cancelled.lock();
        let mut guard = self.state.lock();
        let Some(st) = guard.take() else {
            return Ok(());
        };
        self.open.store(false, Ordering::Release);

        // Permanently suppress further wakeup writes; the pipe is about
        // to go away.
        self.wakeup.lock().triggered = true;

        for i in 1..st.total_channels {
            if i % MAX_SELECTABLE_FDS == 0 {
                continue;
            }
            if let Some(key) = &st.table[i] {
                key.invalidate();
                key.set_index(-1);
                let channel = key.channel();
                if !channel.is_open() && !channel.is_registered() {
                    if let Err(e) = channel.kill() {
                        tracing::debug!(fd = channel.fd(), error = %e, "channel kill failed");
                    }
                }
            }
        }

        self.fd_map.lock().clear();
        keys.clear();
        selected.clear();
        cancelled.clear();
        drop(guard);
        drop(st); // releases the poll array, retired buffers, pipe fds

        let mut threads = self.threads.lock();
        for thread in threads.drain(..) {
            thread.make_zombie();
        }
        self.start_lock.release_all();
        tracing::debug!("selector closed");
        Ok(())
    }
}
