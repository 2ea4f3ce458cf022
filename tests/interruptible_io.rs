//! Interrupt delivery: aborting a blocked read through the channel's
//! close path, and turning an interrupt of a selecting thread into a
//! wakeup.

mod common;

use common::*;
use fanmux::channel::InterruptibleChannel;
use fanmux::{interrupt, ErrorKind, Ops, Selector};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn interrupt_aborts_blocked_read() {
    init_test_logging();
    fanmux::test_phase!("interrupt_aborts_blocked_read");

    let chan = StreamChannel::blocking();
    let reader = Arc::clone(&chan);
    let (id_tx, id_rx) = std::sync::mpsc::channel();

    let handle = std::thread::spawn(move || {
        id_tx.send(std::thread::current().id()).unwrap();
        let result = StreamChannel::read_blocking(&reader);
        let still_interrupted = interrupt::current_interrupted();
        interrupt::clear_interrupted();
        (result, still_interrupted)
    });

    let target = id_rx.recv().unwrap();
    std::thread::sleep(Duration::from_millis(80));
    interrupt::interrupt(target);

    let (result, still_interrupted) = handle.join().expect("reader panicked");
    let err = result.expect_err("read must fail");
    assert_eq!(err.kind(), ErrorKind::ClosedByInterrupt);
    assert!(still_interrupted, "interrupt status must survive the abort");
    assert!(!InterruptibleChannel::is_open(&*chan));
    fanmux::test_complete!("interrupt_aborts_blocked_read");
}

#[test]
fn concurrent_close_aborts_blocked_read() {
    init_test_logging();
    fanmux::test_phase!("concurrent_close_aborts_blocked_read");

    let chan = StreamChannel::blocking();
    let reader = Arc::clone(&chan);

    let handle = std::thread::spawn(move || StreamChannel::read_blocking(&reader));

    std::thread::sleep(Duration::from_millis(80));
    chan.close().expect("close failed");

    let err = handle
        .join()
        .expect("reader panicked")
        .expect_err("read must fail");
    assert_eq!(err.kind(), ErrorKind::AsyncClose);
    fanmux::test_complete!("concurrent_close_aborts_blocked_read");
}

#[test]
fn completed_read_is_not_disturbed() {
    init_test_logging();
    fanmux::test_phase!("completed_read_is_not_disturbed");

    let chan = StreamChannel::blocking();
    chan.make_readable();
    let n = StreamChannel::read_blocking(&chan).expect("read failed");
    assert_eq!(n, 1);
    assert!(InterruptibleChannel::is_open(&*chan));
    fanmux::test_complete!("completed_read_is_not_disturbed");
}

#[test]
fn interrupting_selecting_thread_wakes_selector() {
    init_test_logging();
    fanmux::test_phase!("interrupting_selecting_thread_wakes_selector");

    let selector = Arc::new(Selector::open().expect("open failed"));
    let chan = StreamChannel::nonblocking();
    selector
        .register(Arc::clone(&chan) as Arc<dyn fanmux::Selectable>, Ops::READ, None)
        .expect("register failed");

    let select_side = Arc::clone(&selector);
    let (id_tx, id_rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        id_tx.send(std::thread::current().id()).unwrap();
        let start = Instant::now();
        let result = select_side.select();
        let interrupted = interrupt::current_interrupted();
        interrupt::clear_interrupted();
        (result, interrupted, start.elapsed())
    });

    let target = id_rx.recv().unwrap();
    std::thread::sleep(Duration::from_millis(80));
    interrupt::interrupt(target);

    let (result, interrupted, elapsed) = handle.join().expect("select thread panicked");
    let updated = result.expect("select failed");
    assert_eq!(updated, 0);
    assert!(interrupted, "interrupt status set after select returns");
    assert!(elapsed < Duration::from_secs(2));

    // The wakeup was consumed by that round; the selector still blocks
    // normally afterwards.
    let start = Instant::now();
    let updated = selector.select_millis(80).expect("select failed");
    assert_eq!(updated, 0);
    assert!(start.elapsed() >= Duration::from_millis(60));
    fanmux::test_complete!("interrupting_selecting_thread_wakes_selector");
}

#[test]
fn pre_interrupted_thread_selects_without_blocking() {
    init_test_logging();
    fanmux::test_phase!("pre_interrupted_thread_selects_without_blocking");

    let selector = Arc::new(Selector::open().expect("open failed"));
    let chan = StreamChannel::nonblocking();
    selector
        .register(Arc::clone(&chan) as Arc<dyn fanmux::Selectable>, Ops::READ, None)
        .expect("register failed");

    let select_side = Arc::clone(&selector);
    let handle = std::thread::spawn(move || {
        interrupt::interrupt(std::thread::current().id());
        let start = Instant::now();
        let result = select_side.select();
        interrupt::clear_interrupted();
        (result, start.elapsed())
    });

    let (result, elapsed) = handle.join().expect("select thread panicked");
    assert_eq!(result.expect("select failed"), 0);
    assert!(elapsed < Duration::from_secs(2));
    fanmux::test_complete!("pre_interrupted_thread_selects_without_blocking");
}
