//! Channel-side contract consumed by the multiplexer.
//!
//! The selector never names a concrete channel type. Everything it
//! needs from a registered endpoint travels through the [`Selectable`]
//! capability trait: a stable descriptor, the channel's valid operation
//! set, interest/readiness translation, and end-of-life notification.
//! The one place the engine historically asked "is this a TCP socket?"
//! (urgent-data discard on the exception list) is served by
//! [`Selectable::kind`] instead of a downcast.
//!
//! [`translate_ready`] implements the standard readiness translation
//! for stream-like endpoints; channel implementations with extra state
//! (a pending connect, for instance) override the trait's translation
//! methods and gate the bits themselves.

mod interruptible;

pub use interruptible::{InterruptibleChannel, IoCore};

use std::io;
use std::os::fd::RawFd;

use crate::ops::Ops;
use crate::selector::SelectionKey;
use crate::sys::event;

/// Classification of a registered channel, for the few decisions the
/// selector makes per channel class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// A connected TCP byte stream; eligible for urgent-data discard.
    TcpStream,
    /// A listening TCP socket.
    TcpListener,
    /// A datagram socket.
    Datagram,
    /// A pipe or socketpair endpoint.
    Pipe,
    /// Anything else.
    Other,
}

/// Capability interface a channel must satisfy to be registered with a
/// selector.
pub trait Selectable: Send + Sync {
    /// The channel's descriptor; stable while the channel is registered.
    fn fd(&self) -> RawFd;

    /// The operations this channel class supports.
    fn valid_ops(&self) -> Ops;

    /// What kind of endpoint this is.
    fn kind(&self) -> ChannelKind {
        ChannelKind::Other
    }

    /// Whether the channel is open from the application's point of view.
    fn is_open(&self) -> bool;

    /// Whether the channel is still registered with any selector.
    fn is_registered(&self) -> bool;

    /// Translates an interest set into the abstract event bits stored in
    /// the poll array.
    fn translate_interest(&self, ops: Ops) -> i16 {
        translate_interest(ops)
    }

    /// Overwrites the key's ready set from the reported events. Returns
    /// true if the visible ready set changed.
    fn translate_and_set_ready(&self, revents: i16, key: &SelectionKey) -> bool {
        translate_ready(revents, Ops::NONE, key)
    }

    /// Merges the reported events into the key's ready set. Returns true
    /// if the visible ready set changed.
    fn translate_and_update_ready(&self, revents: i16, key: &SelectionKey) -> bool {
        translate_ready(revents, key.raw_ready(), key)
    }

    /// Releases remaining native state. Invoked once the channel is both
    /// closed and fully deregistered.
    fn kill(&self) -> io::Result<()>;
}

/// Standard interest translation: `READ`/`ACCEPT` poll for input,
/// `WRITE` for output, `CONNECT` for connect completion.
#[must_use]
pub fn translate_interest(ops: Ops) -> i16 {
    let mut events: i16 = 0;
    if ops.intersects(Ops::READ.add(Ops::ACCEPT)) {
        events |= event::POLLIN;
    }
    if ops.is_writable() {
        events |= event::POLLOUT;
    }
    if ops.is_connectable() {
        events |= event::POLLCONN;
    }
    events
}

/// Standard readiness translation for stream-like endpoints.
///
/// Starting from `initial` (empty for set-semantics, the key's current
/// ready set for update-semantics), folds the reported abstract events
/// into operation bits, masks them by the key's interest set, stores the
/// result, and reports whether any bit became ready that was not before.
///
/// An error or hangup marks every interest bit ready, so the
/// application discovers the condition on its next operation. An
/// invalid-descriptor report changes nothing.
pub fn translate_ready(revents: i16, initial: Ops, key: &SelectionKey) -> bool {
    let interest = key.raw_interest();
    let old = key.raw_ready();

    if revents & event::POLLNVAL != 0 {
        return false;
    }
    if revents & (event::POLLERR | event::POLLHUP) != 0 {
        key.set_raw_ready(interest);
        return !interest.remove(old).is_empty();
    }

    let mut new = initial;
    if revents & event::POLLIN != 0 {
        new = new.add(interest & Ops::READ.add(Ops::ACCEPT));
    }
    if revents & event::POLLCONN != 0 {
        new = new.add(interest & Ops::CONNECT);
    }
    if revents & event::POLLOUT != 0 {
        new = new.add(interest & Ops::WRITE);
    }
    key.set_raw_ready(new);
    !new.remove(old).is_empty()
}
