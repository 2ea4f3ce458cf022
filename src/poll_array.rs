//! Contiguous native poll-array buffer.
//!
//! A [`PollArray`] mirrors the kernel's `pollfd` layout in one heap
//! allocation so that a poller can hand a slice of it straight to the
//! native poll call. Slots hold `(fd, events, revents)`; slot indexes
//! correspond one-to-one with the selector's channel table.
//!
//! Mutation discipline: structural writes (`add_entry`, `replace_entry`,
//! `clear_entry`, `grow`) happen only under the selector's close lock.
//! `put_event_ops` is a single word store at a fixed offset and may run
//! while a poller is reading the same slot; the poll either sees the old
//! interest word or the new one, and the level-triggered contract makes
//! both outcomes correct. `grow` hands the retired allocation back to
//! the caller instead of freeing it, so a poller still mid-call on the
//! old buffer never reads freed memory.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::os::fd::RawFd;
use std::ptr::NonNull;

use crate::sys;

/// Heap buffer of kernel-ABI `pollfd` slots.
pub(crate) struct PollArray {
    ptr: NonNull<libc::pollfd>,
    capacity: usize,
}

// Safety: shared access is limited to `put_event_ops` word stores and
// slice polls over disjoint index ranges; everything structural is
// serialized by the owner's close lock.
unsafe impl Send for PollArray {}
unsafe impl Sync for PollArray {}

impl PollArray {
    /// Allocates a zeroed array of `capacity` slots.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "poll array capacity must be non-zero");
        let layout = Self::layout(capacity);
        // Safety: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<libc::pollfd>()) else {
            handle_alloc_error(layout);
        };
        Self { ptr, capacity }
    }

    fn layout(capacity: usize) -> Layout {
        Layout::array::<libc::pollfd>(capacity).expect("poll array layout overflow")
    }

    /// Number of slots in the backing allocation.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw base pointer consumed by the native poll call.
    pub(crate) fn base_ptr(&self) -> *mut libc::pollfd {
        self.ptr.as_ptr()
    }

    fn slot(&self, index: usize) -> *mut libc::pollfd {
        debug_assert!(index < self.capacity, "poll array index out of range");
        // Safety: index checked against capacity above.
        unsafe { self.ptr.as_ptr().add(index) }
    }

    /// Writes a fresh channel entry: the fd with no interest yet.
    pub(crate) fn add_entry(&mut self, index: usize, fd: RawFd) {
        // Safety: exclusive access through &mut self.
        unsafe {
            *self.slot(index) = libc::pollfd {
                fd,
                events: 0,
                revents: 0,
            };
        }
    }

    /// Writes a wakeup sentinel entry. The slot is sticky: read interest
    /// stays set for the lifetime of the slice.
    pub(crate) fn add_wakeup_entry(&mut self, index: usize, fd: RawFd) {
        // Safety: exclusive access through &mut self.
        unsafe {
            *self.slot(index) = libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            };
        }
    }

    /// Overwrites only the interest word of a slot, translating abstract
    /// event bits to kernel bits. Safe to call while the slot's slice is
    /// being polled.
    pub(crate) fn put_event_ops(&self, index: usize, events: i16) {
        let slot = self.slot(index);
        // Safety: a single i16 store at a fixed offset; concurrent
        // readers observe either the old word or the new one.
        unsafe {
            std::ptr::addr_of_mut!((*slot).events).write_volatile(sys::to_kernel_events(events));
        }
    }

    /// Copies the slot at `src` over the slot at `dst` by value.
    pub(crate) fn replace_entry(&mut self, src: usize, dst: usize) {
        // Safety: both indexes checked by slot(); exclusive access.
        unsafe {
            *self.slot(dst) = *self.slot(src);
        }
    }

    /// Zeroes a slot.
    pub(crate) fn clear_entry(&mut self, index: usize) {
        // Safety: exclusive access through &mut self.
        unsafe {
            *self.slot(index) = libc::pollfd {
                fd: 0,
                events: 0,
                revents: 0,
            };
        }
    }

    /// Descriptor stored at a slot.
    pub(crate) fn fd_at(&self, index: usize) -> RawFd {
        // Safety: index checked by slot().
        unsafe { (*self.slot(index)).fd }
    }

    /// Grows to `new_capacity` slots, copying all existing entries.
    /// Returns the retired allocation; the caller parks it until no
    /// poller can still be reading it.
    #[must_use]
    pub(crate) fn grow(&mut self, new_capacity: usize) -> PollArray {
        assert!(new_capacity > self.capacity, "poll array can only grow");
        let mut bigger = Self::with_capacity(new_capacity);
        // Safety: distinct allocations, copy bounded by old capacity.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), bigger.ptr.as_ptr(), self.capacity);
        }
        std::mem::replace(self, bigger)
    }
}

impl Drop for PollArray {
    fn drop(&mut self) {
        let layout = Self::layout(self.capacity);
        // Safety: ptr was allocated with exactly this layout.
        unsafe {
            dealloc(self.ptr.as_ptr().cast(), layout);
        }
    }
}

impl std::fmt::Debug for PollArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollArray")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
