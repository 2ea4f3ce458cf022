#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use fanmux::channel::{ChannelKind, InterruptibleChannel, IoCore, Selectable};
use fanmux::selector::SelectionKey;
use fanmux::{Error, Ops};

pub use fanmux::test_utils::init_test_logging;

/// Socketpair-backed channel: the registered end is `local`, tests
/// drive readiness through `peer`.
pub struct StreamChannel {
    core: IoCore,
    local: UnixStream,
    peer: UnixStream,
    registered: AtomicBool,
    kills: AtomicUsize,
}

impl StreamChannel {
    /// A channel whose registered end is non-blocking, for select tests.
    pub fn nonblocking() -> Arc<Self> {
        let chan = Self::new_pair();
        chan.local
            .set_nonblocking(true)
            .expect("set_nonblocking failed");
        chan
    }

    /// A channel whose registered end blocks, for interruptible-read
    /// tests.
    pub fn blocking() -> Arc<Self> {
        Self::new_pair()
    }

    fn new_pair() -> Arc<Self> {
        let (local, peer) = UnixStream::pair().expect("socketpair failed");
        Arc::new(Self {
            core: IoCore::new(),
            local,
            peer,
            registered: AtomicBool::new(false),
            kills: AtomicUsize::new(0),
        })
    }

    /// Queues one byte so the registered end reports readable.
    pub fn make_readable(&self) {
        use std::io::Write;
        (&self.peer).write_all(&[1]).expect("peer write failed");
    }

    /// Drains whatever is queued on the registered end.
    pub fn drain(&self) {
        use std::io::Read;
        let mut buf = [0u8; 64];
        while let Ok(n) = (&self.local).read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    }

    /// Times this channel's `kill` has run.
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// A blocking read bracketed by the interruptible-channel protocol.
    ///
    /// Blocks until a byte arrives, the channel is closed concurrently
    /// (`AsyncClose`), or the calling thread is interrupted
    /// (`ClosedByInterrupt`).
    pub fn read_blocking(this: &Arc<Self>) -> Result<usize, Error> {
        let mut buf = [0u8; 8];
        Self::begin(this);
        let n = unsafe { libc::read(this.local.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        let completed = n > 0;
        this.end(completed)?;
        if n < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }
        Ok(n as usize)
    }
}

impl Selectable for StreamChannel {
    fn fd(&self) -> RawFd {
        self.local.as_raw_fd()
    }

    fn valid_ops(&self) -> Ops {
        Ops::READ | Ops::WRITE
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Pipe
    }

    fn is_open(&self) -> bool {
        InterruptibleChannel::is_open(self)
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    fn kill(&self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl InterruptibleChannel for StreamChannel {
    fn io(&self) -> &IoCore {
        &self.core
    }

    fn impl_close_channel(&self) -> io::Result<()> {
        // Shutdown rather than close: unblocks a reader stuck in the
        // kernel while keeping the descriptor number valid for any
        // in-flight poll round.
        let rc = unsafe { libc::shutdown(self.local.as_raw_fd(), libc::SHUT_RDWR) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotConnected {
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Loopback TCP channel, for paths that only apply to real TCP sockets
/// (urgent-data discard).
pub struct TcpChannel {
    local: TcpStream,
    peer: TcpStream,
    open: AtomicBool,
}

impl TcpChannel {
    pub fn connected() -> Arc<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let addr = listener.local_addr().expect("local_addr failed");
        let peer = TcpStream::connect(addr).expect("connect failed");
        let (local, _) = listener.accept().expect("accept failed");
        local.set_nonblocking(true).expect("set_nonblocking failed");
        peer.set_nodelay(true).expect("set_nodelay failed");
        Arc::new(Self {
            local,
            peer,
            open: AtomicBool::new(true),
        })
    }

    /// Sends one urgent (out-of-band) byte from the peer.
    pub fn send_urgent(&self) {
        let byte = [b'!'];
        let n = unsafe {
            libc::send(
                self.peer.as_raw_fd(),
                byte.as_ptr().cast(),
                1,
                libc::MSG_OOB,
            )
        };
        assert_eq!(n, 1, "urgent send failed");
    }

    /// Sends one ordinary byte from the peer.
    pub fn send_plain(&self) {
        use std::io::Write;
        (&self.peer).write_all(&[7]).expect("peer write failed");
    }
}

impl Selectable for TcpChannel {
    fn fd(&self) -> RawFd {
        self.local.as_raw_fd()
    }

    fn valid_ops(&self) -> Ops {
        Ops::READ | Ops::WRITE | Ops::CONNECT
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::TcpStream
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn is_registered(&self) -> bool {
        false
    }

    fn kill(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Channel with a fabricated descriptor. The kernel reports the entry
/// invalid, which the selector surfaces as no readiness; useful for
/// populating the channel table at scale without consuming real
/// descriptors.
pub struct PhantomChannel {
    fd: RawFd,
}

impl PhantomChannel {
    pub fn with_ordinal(ordinal: i32) -> Arc<dyn Selectable> {
        Arc::new(Self {
            fd: 1_000_000 + ordinal,
        })
    }
}

impl Selectable for PhantomChannel {
    fn fd(&self) -> RawFd {
        self.fd
    }

    fn valid_ops(&self) -> Ops {
        Ops::READ | Ops::WRITE
    }

    fn is_open(&self) -> bool {
        true
    }

    fn is_registered(&self) -> bool {
        false
    }

    fn kill(&self) -> io::Result<()> {
        Ok(())
    }
}

/// True if `keys` contains exactly the given key, by identity.
pub fn is_exactly(keys: &[Arc<SelectionKey>], key: &Arc<SelectionKey>) -> bool {
    keys.len() == 1 && Arc::ptr_eq(&keys[0], key)
}
