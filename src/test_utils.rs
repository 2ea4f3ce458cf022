//! Test utilities for Fanmux.
//!
//! Shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Scenario/step macros for readable test output
//! - A value-logging assertion macro
//!
//! # Example
//! ```
//! use fanmux::test_utils::init_test_logging;
//!
//! fn my_test() {
//!     init_test_logging();
//!     fanmux::test_phase!("my_test");
//!     // test body
//!     fanmux::test_complete!("my_test");
//! }
//! ```

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Mark the start of a test scenario in the log.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(scenario = %$name, "---- scenario start: {} ----", $name);
    };
}

/// Log one step within a test scenario.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(step = %$name, "step: {}", $name);
    };
}

/// Mark a scenario as finished, optionally with summary fields.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(scenario = %$name, "---- scenario done: {} ----", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            scenario = %$name,
            $($key = %$value,)*
            "---- scenario done: {} ----",
            $name
        );
    };
}

/// Log the expected and observed values before asserting on them.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(want = ?$expected, got = ?$actual, "checking: {}", $msg);
        assert!($cond, "{}: want {:?}, got {:?}", $msg, $expected, $actual);
    };
}
