//! Fanmux: a multi-threaded fan-out readiness selector.
//!
//! # Overview
//!
//! Fanmux lets one application coordinate many non-blocking byte
//! channels by asking the operating system which are ready for read,
//! write, connect, or accept. The underlying readiness primitive is an
//! array-based, level-triggered poll whose per-call capacity is bounded;
//! past that bound a single [`Selector`] transparently splits its
//! registered channels across a pool of helper threads, runs one
//! synchronized poll round, and merges the per-thread results back into
//! one selected-key set — while keeping the externally observable
//! contract of a single-threaded readiness multiplexer.
//!
//! # Core Guarantees
//!
//! - **One round, one answer**: the ready set observed on any key
//!   reflects exactly one kernel poll, and each key counts at most once
//!   in a round's return value, however many result lists it surfaces in
//! - **Ready ⊆ interest**: after any select returns, a key's ready set
//!   never exceeds its interest set
//! - **Prompt wakeup**: `wakeup()` before a round makes it return
//!   immediately; during a round it cuts every slice's poll short
//! - **Abortable blocking**: asynchronous close and thread interrupt
//!   funnel through one descriptor-close path and surface as typed
//!   errors
//!
//! # Module Structure
//!
//! - [`selector`]: the multiplexer engine, selection keys, helper pool
//! - [`channel`]: the capability trait channels implement, plus the
//!   interruptible-channel base
//! - [`ops`]: interest/ready bitsets
//! - [`interrupt`]: per-thread interrupt status and interruptor slots
//! - [`sys`]: the native poll ABI (abstract event bits live here)
//! - [`error`]: typed errors
//! - [`test_utils`]: logging init and assertion macros for tests

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod channel;
pub mod error;
pub mod interrupt;
pub mod ops;
pub mod selector;
pub mod sys;
pub mod test_utils;

pub(crate) mod poll_array;

// Re-exports for convenient access to core types
pub use channel::{ChannelKind, InterruptibleChannel, IoCore, Selectable};
pub use error::{Error, ErrorKind, Result};
pub use ops::Ops;
pub use selector::{
    Attachment, SelectionKey, Selector, SelectorBuilder, MAX_SELECTABLE_FDS,
};
