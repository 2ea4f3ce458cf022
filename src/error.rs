//! Error types for the selector core.
//!
//! Errors are explicit and typed. Every failure carries an [`ErrorKind`]
//! that callers can match on; free-text context and a source error are
//! optional extras, never the primary classification.

use core::fmt;
use std::sync::Arc;

/// The kind of selector error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Any use of a selector after `close()`, other than `close`/`wakeup`.
    ClosedSelector,
    /// Operation on a channel that is no longer open.
    ClosedChannel,
    /// Access to key state (other than channel/selector/attachment) after
    /// the key was cancelled.
    CancelledKey,
    /// Interest bits outside the channel's valid set, or a negative
    /// timeout.
    IllegalArgument,
    /// A blocked I/O call was aborted by a concurrent close of its
    /// channel.
    AsyncClose,
    /// A blocked I/O call was aborted because the blocked thread was
    /// interrupted. The thread's interrupt status remains set.
    ClosedByInterrupt,
    /// An error surfaced from the native poll layer.
    Io,
}

/// The error type for selector operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds context text to the error.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Shorthand for a closed-selector error.
    #[must_use]
    pub const fn closed_selector() -> Self {
        Self::new(ErrorKind::ClosedSelector)
    }

    /// Shorthand for a closed-channel error.
    #[must_use]
    pub const fn closed_channel() -> Self {
        Self::new(ErrorKind::ClosedChannel)
    }

    /// Shorthand for a cancelled-key error.
    #[must_use]
    pub const fn cancelled_key() -> Self {
        Self::new(ErrorKind::CancelledKey)
    }

    /// Returns true if this error reports a closed selector.
    #[must_use]
    pub const fn is_closed_selector(&self) -> bool {
        matches!(self.kind, ErrorKind::ClosedSelector)
    }

    /// Returns true if this error aborted a blocked I/O call, whether by
    /// close or by interrupt.
    #[must_use]
    pub const fn is_aborted_io(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::AsyncClose | ErrorKind::ClosedByInterrupt
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io).with_source(e)
    }
}

/// Result alias using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;
