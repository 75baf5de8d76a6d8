//! Property tests for marker tracking and signal coalescing.

use proptest::prelude::*;
use std::time::Duration;
use storewatch::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Touch,
    Poll,
    Drain,
    Trigger,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Touch),
        3 => Just(Op::Poll),
        1 => Just(Op::Drain),
        1 => Just(Op::Trigger),
    ]
}

/// Runs `ops` against a started watcher whose loop is never driven, so only
/// explicit polls and triggers touch the watcher.
fn run(ops: &[Op], ignore_window: Duration, save_first: bool) -> Vec<(Op, PollOutcome, bool)> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let store = MemoryStore::new();
    let settings = WatchSettings::new(Duration::from_secs(3600), ignore_window);
    let watcher = StoreWatcher::new(store.clone(), settings).unwrap();
    let reloads = watcher.reload_channel();
    watcher.start().unwrap();

    if save_first {
        watcher.notify_save();
    }

    let mut log = Vec::new();
    for op in ops {
        let (outcome, drained) = match op {
            Op::Touch => {
                store.touch();
                (PollOutcome::Unchanged, false)
            }
            Op::Poll => (watcher.poll_now(), false),
            Op::Drain => (PollOutcome::Unchanged, reloads.try_recv()),
            Op::Trigger => (watcher.trigger_reload(), false),
        };

        // The watcher never runs ahead of the store
        assert!(watcher.last_seen() <= store.last_modified().unwrap());
        log.push((op.clone(), outcome, drained));
    }

    // At most one signal is ever pending
    reloads.try_recv();
    assert!(!reloads.try_recv());
    log
}

proptest! {
    #[test]
    fn prop_poll_after_touch_always_reloads(ops in prop::collection::vec(op(), 1..60)) {
        let log = run(&ops, Duration::ZERO, false);

        let mut dirty = false;
        for (op, outcome, _) in &log {
            match op {
                Op::Touch => dirty = true,
                Op::Poll => {
                    prop_assert_eq!(outcome.will_reload(), dirty);
                    dirty = false;
                }
                Op::Trigger => {
                    prop_assert!(outcome.will_reload());
                    dirty = false;
                }
                Op::Drain => {}
            }
        }
    }

    #[test]
    fn prop_polls_inside_window_never_signal(ops in prop::collection::vec(op(), 1..60)) {
        let log = run(&ops, Duration::from_secs(3600), true);

        for (op, outcome, _) in &log {
            if let Op::Poll = op {
                prop_assert!(!outcome.will_reload());
            }
        }
    }

    #[test]
    fn prop_drains_never_exceed_signals(ops in prop::collection::vec(op(), 1..60)) {
        let log = run(&ops, Duration::ZERO, false);

        let mut pending = false;
        for (_, outcome, drained) in &log {
            if *outcome == PollOutcome::Signaled {
                prop_assert!(!pending);
                pending = true;
            }
            if *outcome == PollOutcome::Coalesced {
                prop_assert!(pending);
            }
            if *drained {
                prop_assert!(pending);
                pending = false;
            }
        }
    }
}
