//! Fan-out across helper threads: slice accounting past the per-call
//! ceiling and merged results equal to the union of per-slice results.

mod common;

use common::*;
use fanmux::{Ops, Selector, MAX_SELECTABLE_FDS};
use std::sync::Arc;

/// User channels per slice: every slice spends one slot on its wakeup
/// sentinel.
const SLICE_USER_CAPACITY: usize = MAX_SELECTABLE_FDS - 1;

#[test]
fn two_thousand_channels_need_one_helper() {
    init_test_logging();
    fanmux::test_phase!("two_thousand_channels_need_one_helper");

    let selector = Selector::open().expect("open failed");
    let keys: Vec<_> = (0..2000)
        .map(|i| {
            selector
                .register(PhantomChannel::with_ordinal(i), Ops::READ, None)
                .expect("register failed")
        })
        .collect();

    // 2000 user channels span two slices (1023 + 977), so one helper
    // slice beyond the main thread's.
    assert_eq!(selector.registered_count(), 2000);
    assert_eq!(selector.helper_count(), 1);
    assert_eq!(selector.thread_count(), 0, "helpers spawn at first select");

    selector.select_now().expect("select_now failed");
    assert_eq!(selector.thread_count(), 1);

    drop(keys);
    fanmux::test_complete!("two_thousand_channels_need_one_helper");
}

#[test]
fn readable_channel_found_in_helper_slice() {
    init_test_logging();
    fanmux::test_phase!("readable_channel_found_in_helper_slice");

    let selector = Selector::open().expect("open failed");
    let mut live = None;
    for i in 0..2000 {
        if i == 1500 {
            let chan = StreamChannel::nonblocking();
            let key = selector
                .register(Arc::clone(&chan) as Arc<dyn fanmux::Selectable>, Ops::READ, None)
                .expect("register failed");
            live = Some((chan, key));
        } else {
            selector
                .register(PhantomChannel::with_ordinal(i), Ops::READ, None)
                .expect("register failed");
        }
    }
    let (chan, key) = live.expect("live channel registered");
    // Registration #1500 plus the slice-0 sentinel puts the live
    // channel well inside the helper's slice.
    assert!(key.index() >= MAX_SELECTABLE_FDS as i64);

    chan.make_readable();
    let updated = selector.select().expect("select failed");

    assert_eq!(updated, 1);
    assert!(is_exactly(&selector.selected_keys(), &key));
    assert_eq!(key.ready_ops().unwrap(), Ops::READ);
    assert_eq!(selector.thread_count(), 1);
    fanmux::test_complete!("readable_channel_found_in_helper_slice");
}

#[test]
fn merged_results_union_across_three_slices() {
    init_test_logging();
    fanmux::test_phase!("merged_results_union_across_three_slices");

    let selector = Selector::open().expect("open failed");
    let mut live = Vec::new();
    // Three slices: main (0..1023 users), helper 0, helper 1. One live
    // channel lands in each.
    let total_users = 2 * SLICE_USER_CAPACITY + 60;
    let live_at = [
        500,
        SLICE_USER_CAPACITY + 500,
        2 * SLICE_USER_CAPACITY + 30,
    ];
    for i in 0..total_users {
        if live_at.contains(&i) {
            let chan = StreamChannel::nonblocking();
            let key = selector
                .register(Arc::clone(&chan) as Arc<dyn fanmux::Selectable>, Ops::READ, None)
                .expect("register failed");
            live.push((chan, key));
        } else {
            selector
                .register(PhantomChannel::with_ordinal(i as i32), Ops::READ, None)
                .expect("register failed");
        }
    }
    assert_eq!(selector.helper_count(), 2);

    // Distinct slices by poll-array position.
    let slices: Vec<_> = live
        .iter()
        .map(|(_, key)| key.index() as usize / MAX_SELECTABLE_FDS)
        .collect();
    assert_eq!(slices, vec![0, 1, 2]);

    for (chan, _) in &live {
        chan.make_readable();
    }
    let updated = selector.select().expect("select failed");

    // The merged set is exactly the union of the three slices' results:
    // every live key once, nothing else.
    assert_eq!(updated, 3);
    let selected = selector.selected_keys();
    assert_eq!(selected.len(), 3);
    for (_, key) in &live {
        assert!(
            selected.iter().any(|s| Arc::ptr_eq(s, key)),
            "live key missing from merged results"
        );
    }
    assert_eq!(selector.thread_count(), 2);

    // A second round with nothing new: the same keys stay selected but
    // count zero.
    let updated = selector.select_now().expect("select_now failed");
    assert_eq!(updated, 0);
    fanmux::test_complete!("merged_results_union_across_three_slices");
}

#[test]
fn helper_slices_retire_as_population_drops() {
    init_test_logging();
    fanmux::test_phase!("helper_slices_retire_as_population_drops");

    let selector = Selector::open().expect("open failed");
    let keys: Vec<_> = (0..(SLICE_USER_CAPACITY + 200) as i32)
        .map(|i| {
            selector
                .register(PhantomChannel::with_ordinal(i), Ops::READ, None)
                .expect("register failed")
        })
        .collect();
    assert_eq!(selector.helper_count(), 1);

    selector.select_now().expect("select_now failed");
    assert_eq!(selector.thread_count(), 1);

    // Cancel everything in the helper slice; it retires, and the next
    // round zombies the surplus thread.
    for key in &keys[SLICE_USER_CAPACITY..] {
        key.cancel();
    }
    selector.select_now().expect("select_now failed");
    assert_eq!(selector.helper_count(), 0);
    assert_eq!(selector.registered_count(), SLICE_USER_CAPACITY);
    assert_eq!(selector.thread_count(), 0);
    fanmux::test_complete!("helper_slices_retire_as_population_drops");
}

#[test]
fn past_second_boundary_needs_two_helpers() {
    init_test_logging();
    fanmux::test_phase!("past_second_boundary_needs_two_helpers");

    let selector = Selector::open().expect("open failed");
    for i in 0..(2 * SLICE_USER_CAPACITY + 1) as i32 {
        selector
            .register(PhantomChannel::with_ordinal(i), Ops::READ, None)
            .expect("register failed");
    }
    assert_eq!(selector.helper_count(), 2);

    selector.select_now().expect("select_now failed");
    assert_eq!(selector.thread_count(), 2);
    fanmux::test_complete!("past_second_boundary_needs_two_helpers");
}
