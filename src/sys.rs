//! Native poll ABI.
//!
//! This module owns every syscall the selector core makes: polling a
//! slice of the shared poll array, the wakeup pipe, and urgent-data
//! discard. The rest of the crate deals in the abstract event bits of
//! [`event`]; kernel-specific bit layouts stay behind this boundary.
//!
//! Each poll classifies ready descriptors into three result lists: a
//! descriptor lands in the read list when it is readable or has hung up
//! or errored, in the write list when it is writable or errored, and in
//! the exception list when urgent data is pending.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Abstract event bits exchanged with channel implementations.
///
/// These are the values a channel's `translate_interest` produces and
/// its `translate_and_*_ready` methods receive. They are wire-stable;
/// translation to the kernel's `pollfd` bits happens inside this
/// module.
pub mod event {
    /// Data is readable.
    pub const POLLIN: i16 = 0x0001;
    /// A non-blocking connect has completed.
    pub const POLLCONN: i16 = 0x0002;
    /// Data is writable.
    pub const POLLOUT: i16 = 0x0004;
    /// An error condition is pending.
    pub const POLLERR: i16 = 0x0008;
    /// The peer hung up.
    pub const POLLHUP: i16 = 0x0010;
    /// The descriptor is not valid.
    pub const POLLNVAL: i16 = 0x0020;
}

/// Translates abstract event bits into the kernel's `pollfd` request
/// bits. Connect interest is expressed to the kernel as writability.
pub(crate) fn to_kernel_events(events: i16) -> i16 {
    let mut bits: i16 = 0;
    if events & event::POLLIN != 0 {
        bits |= libc::POLLIN;
    }
    if events & (event::POLLOUT | event::POLLCONN) != 0 {
        bits |= libc::POLLOUT;
    }
    bits
}

/// Result lists of one poll call over one slice.
///
/// Reused across rounds to avoid per-round allocation.
#[derive(Debug, Default)]
pub(crate) struct FdResults {
    pub(crate) read: Vec<RawFd>,
    pub(crate) write: Vec<RawFd>,
    pub(crate) except: Vec<RawFd>,
}

impl FdResults {
    pub(crate) fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
        self.except.clear();
    }
}

/// Polls `nfds` entries starting at `base`, classifying ready
/// descriptors into the three result lists.
///
/// `timeout_ms < 0` blocks indefinitely, `0` returns immediately,
/// positive values bound the wait in milliseconds. A signal interrupting
/// the wait is reported as an empty result, not an error.
///
/// # Safety
///
/// `base..base + nfds` must stay allocated for the duration of the call
/// and no other thread may poll or rewrite entries of the same range
/// concurrently. Interest rewrites through
/// [`PollArray::put_event_ops`](crate::poll_array::PollArray::put_event_ops)
/// are single word stores the kernel may or may not observe this round;
/// that is the level-triggered contract.
pub(crate) unsafe fn poll_slice(
    base: *mut libc::pollfd,
    nfds: usize,
    timeout_ms: i64,
    out: &mut FdResults,
) -> io::Result<usize> {
    out.clear();
    if nfds == 0 {
        return Ok(0);
    }

    let timeout = if timeout_ms < 0 {
        -1
    } else {
        i32::try_from(timeout_ms).unwrap_or(i32::MAX)
    };

    let n = unsafe { libc::poll(base, nfds as libc::nfds_t, timeout) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(0);
        }
        return Err(err);
    }

    let mut ready = 0usize;
    for i in 0..nfds {
        let entry = unsafe { &*base.add(i) };
        let revents = entry.revents;
        if revents == 0 {
            continue;
        }
        ready += 1;
        // An invalid descriptor reports no readiness at all; the owner
        // discovers the condition through its own channel operations.
        if revents & libc::POLLNVAL != 0 {
            continue;
        }
        if revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
            out.read.push(entry.fd);
        }
        if revents & (libc::POLLOUT | libc::POLLERR) != 0 {
            out.write.push(entry.fd);
        }
        if revents & libc::POLLPRI != 0 {
            out.except.push(entry.fd);
        }
    }
    Ok(ready)
}

/// The selector's internal wakeup pipe.
///
/// The source end sits in the poll array as a sticky sentinel; writing
/// one byte to the sink forces any poll covering a sentinel to return.
/// Both ends are non-blocking. A loopback socket pair would need Nagle
/// disabled on the sink to deliver the byte promptly; a kernel pipe has
/// no such delay in the first place.
#[derive(Debug)]
pub(crate) struct WakeupPipe {
    source: OwnedFd,
    sink: OwnedFd,
}

impl WakeupPipe {
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: pipe2 returned two fresh descriptors we now own.
        let (source, sink) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self { source, sink })
    }

    pub(crate) fn source_fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }

    pub(crate) fn sink_fd(&self) -> RawFd {
        self.sink.as_raw_fd()
    }
}

/// Signals the wakeup pipe: one byte into the sink.
///
/// A full pipe means the signal is already pending, which is as good as
/// delivered.
pub(crate) fn set_wakeup_socket(sink_fd: RawFd) -> io::Result<()> {
    let byte = [1u8];
    let n = unsafe { libc::write(sink_fd, byte.as_ptr().cast(), 1) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock {
            return Err(err);
        }
    }
    Ok(())
}

/// Drains the wakeup pipe back to the non-signaled state.
pub(crate) fn reset_wakeup_socket(source_fd: RawFd) -> io::Result<()> {
    let mut buf = [0u8; 8];
    let n = unsafe { libc::read(source_fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::WouldBlock {
            return Err(err);
        }
    }
    Ok(())
}

/// Reads and discards pending urgent (out-of-band) data on a stream
/// socket. Returns true if an urgent byte was actually consumed.
pub(crate) fn discard_urgent_data(fd: RawFd) -> bool {
    let mut buf = [0u8; 8];
    let n = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), libc::MSG_OOB) };
    n > 0
}
