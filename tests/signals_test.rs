/*!
 * Signal Tests
 * Delivery through the wake pipe, dispatch ordering, and re-entrant
 * registration. Serialized: signal dispositions are process-wide.
 */

use evcore::{EventLoopManager, PumpMode, SignalHandlerId};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn raise(signal: libc::c_int) {
    let ret = unsafe { libc::raise(signal) };
    assert_eq!(ret, 0, "raise failed");
}

#[test]
#[serial]
fn test_signal_dispatches_once_per_delivery() {
    let count = Arc::new(AtomicUsize::new(0));
    let count_in_handler = count.clone();
    let event_loop = EventLoopManager::make_implementation();

    let id = EventLoopManager::register_signal(libc::SIGUSR1, move |signal| {
        assert_eq!(signal, libc::SIGUSR1);
        count_in_handler.fetch_add(1, Ordering::Relaxed);
    });

    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(count.load(Ordering::Relaxed), 1);

    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(count.load(Ordering::Relaxed), 2);

    EventLoopManager::unregister_signal(id);
}

#[test]
#[serial]
fn test_signal_storm_does_not_wedge_the_loop() {
    let count = Arc::new(AtomicUsize::new(0));
    let count_in_handler = count.clone();
    let event_loop = EventLoopManager::make_implementation();

    let id = EventLoopManager::register_signal(libc::SIGUSR1, move |_| {
        count_in_handler.fetch_add(1, Ordering::Relaxed);
    });

    for _ in 0..10 {
        raise(libc::SIGUSR1);
    }
    // The first iteration drains a full token batch and retries for the
    // remainder; one pump call sees every delivery.
    event_loop.pump(PumpMode::WaitForEvents);
    let dispatched = count.load(Ordering::Relaxed);
    assert!((1..=10).contains(&dispatched), "dispatched {dispatched}");

    // The loop keeps running normally afterwards.
    assert_eq!(event_loop.pump(PumpMode::DontWait), 0);

    EventLoopManager::unregister_signal(id);
}

#[test]
#[serial]
fn test_handlers_dispatch_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let event_loop = EventLoopManager::make_implementation();

    let order_a = order.clone();
    let first = EventLoopManager::register_signal(libc::SIGUSR2, move |_| {
        order_a.lock().unwrap().push("first");
    });
    let order_b = order.clone();
    let second = EventLoopManager::register_signal(libc::SIGUSR2, move |_| {
        order_b.lock().unwrap().push("second");
    });

    raise(libc::SIGUSR2);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

    EventLoopManager::unregister_signal(first);
    EventLoopManager::unregister_signal(second);
}

#[test]
#[serial]
fn test_registration_during_dispatch_takes_effect_next_dispatch() {
    let late_count = Arc::new(AtomicUsize::new(0));
    let staged: Arc<Mutex<Vec<SignalHandlerId>>> = Arc::new(Mutex::new(Vec::new()));
    let event_loop = EventLoopManager::make_implementation();

    let late_count_outer = late_count.clone();
    let staged_in_handler = staged.clone();
    let trigger = EventLoopManager::register_signal(libc::SIGUSR1, move |_| {
        if staged_in_handler.lock().unwrap().is_empty() {
            let late_count = late_count_outer.clone();
            let id = EventLoopManager::register_signal(libc::SIGUSR1, move |_| {
                late_count.fetch_add(1, Ordering::Relaxed);
            });
            staged_in_handler.lock().unwrap().push(id);
        }
    });

    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    // The handler added mid-dispatch must not run in the same dispatch.
    assert_eq!(late_count.load(Ordering::Relaxed), 0);

    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(late_count.load(Ordering::Relaxed), 1);

    EventLoopManager::unregister_signal(trigger);
    for id in staged.lock().unwrap().drain(..) {
        EventLoopManager::unregister_signal(id);
    }
}

#[test]
#[serial]
fn test_unregister_own_id_during_dispatch() {
    let once_count = Arc::new(AtomicUsize::new(0));
    let keep_count = Arc::new(AtomicUsize::new(0));
    let event_loop = EventLoopManager::make_implementation();

    let self_id: Arc<Mutex<Option<SignalHandlerId>>> = Arc::new(Mutex::new(None));
    let self_id_in_handler = self_id.clone();
    let once_count_in_handler = once_count.clone();
    let once = EventLoopManager::register_signal(libc::SIGUSR1, move |_| {
        once_count_in_handler.fetch_add(1, Ordering::Relaxed);
        let id = self_id_in_handler.lock().unwrap().take();
        if let Some(id) = id {
            EventLoopManager::unregister_signal(id);
        }
    });
    *self_id.lock().unwrap() = Some(once);

    // A second handler keeps the OS-level installation alive.
    let keep_count_in_handler = keep_count.clone();
    let keeper = EventLoopManager::register_signal(libc::SIGUSR1, move |_| {
        keep_count_in_handler.fetch_add(1, Ordering::Relaxed);
    });

    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(once_count.load(Ordering::Relaxed), 1);
    assert_eq!(keep_count.load(Ordering::Relaxed), 1);

    // The self-removed handler must not be invoked again.
    raise(libc::SIGUSR1);
    event_loop.pump(PumpMode::WaitForEvents);
    assert_eq!(once_count.load(Ordering::Relaxed), 1);
    assert_eq!(keep_count.load(Ordering::Relaxed), 2);

    EventLoopManager::unregister_signal(keeper);
}

#[test]
#[serial]
fn test_unregister_unknown_id_is_ignored() {
    let event_loop = EventLoopManager::make_implementation();
    let id = EventLoopManager::register_signal(libc::SIGUSR2, |_| {});
    EventLoopManager::unregister_signal(id);
    // Repeat removal of an id that no longer exists anywhere.
    EventLoopManager::unregister_signal(id);

    // No handler table entry remains; the loop still pumps cleanly.
    assert_eq!(event_loop.pump(PumpMode::DontWait), 0);
}
