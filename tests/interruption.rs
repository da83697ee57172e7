//! Interruption conformance tests: cooperative delivery, suspended
//! fibers, uninterruptible regions, and cleanup under interruption.

mod common;

use common::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use weft::{Effect, FiberStatus};

#[test]
fn interrupting_a_pending_async_resolves_without_the_callback() {
    let runtime = test_runtime();
    // The registration drops the resume handle: nothing external will
    // ever complete this fiber.
    let fiber = runtime.spawn(Effect::<i32, String>::never());

    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    let exit = fiber.interrupt();
    assert!(exit.is_interrupted());
}

#[test]
fn interrupting_a_settled_fiber_is_a_noop() {
    let runtime = test_runtime();
    let fiber = runtime.spawn(Effect::<i32, String>::succeed(42));

    wait_until("fiber to settle", Duration::from_secs(2), || fiber.is_done());

    fiber.interrupt_request();
    assert_eq!(fiber.join().into_result().ok(), Some(42));
}

#[test]
fn uninterruptible_region_runs_to_completion() {
    let runtime = test_runtime();
    let progress = Arc::new(AtomicU32::new(0));
    let (entered_tx, entered_rx) = mpsc::channel::<()>();

    let in_region = Arc::clone(&progress);
    let after_region = Arc::clone(&progress);
    let region: Effect<(), String> = Effect::sync(move || {
        entered_tx.send(()).expect("test channel");
        // Hold the region open long enough for the interrupt to land
        // while it is running.
        std::thread::sleep(Duration::from_millis(100));
        in_region.store(1, Ordering::SeqCst);
    })
    .and_then(|()| {
        Effect::sync(move || {
            after_region.store(2, Ordering::SeqCst);
        })
    })
    .uninterruptible();

    let tail = Arc::clone(&progress);
    let program = region.and_then(move |()| {
        Effect::sync(move || {
            tail.store(3, Ordering::SeqCst);
        })
    });

    let fiber = runtime.spawn(program);
    entered_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("region must start");
    fiber.interrupt_request();
    let exit = fiber.join();

    // The region finished both steps; the interruptible tail never ran.
    assert_eq!(progress.load(Ordering::SeqCst), 2);
    assert!(exit.is_interrupted());
}

#[test]
fn restore_reexposes_interruptibility_inside_a_mask() {
    let runtime = test_runtime();
    let cleaned = Arc::new(AtomicBool::new(false));

    let witness = Arc::clone(&cleaned);
    let program: Effect<(), String> = Effect::uninterruptible_mask(move |restore| {
        restore
            .apply(Effect::<i32, String>::never())
            .exit()
            .and_then(move |_exit| {
                Effect::sync(move || {
                    witness.store(true, Ordering::SeqCst);
                })
            })
    });

    let fiber = runtime.spawn(program);
    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    // The restored body is interruptible even though the mask is not,
    // and the masked continuation still runs before the interrupt
    // settles the fiber.
    let exit = fiber.interrupt();
    assert!(cleaned.load(Ordering::SeqCst));
    assert!(exit.is_interrupted());
}

#[test]
fn ensuring_runs_its_finalizer_on_interruption() {
    let runtime = test_runtime();
    let finalized = Arc::new(AtomicBool::new(false));

    let witness = Arc::clone(&finalized);
    let program: Effect<i32, String> = Effect::never().ensuring(Effect::sync(move || {
        witness.store(true, Ordering::SeqCst);
    }));

    let fiber = runtime.spawn(program);
    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    let exit = fiber.interrupt();
    assert!(exit.is_interrupted());
    assert!(finalized.load(Ordering::SeqCst));
}

#[test]
fn interruption_attributes_the_external_requester() {
    let runtime = test_runtime();
    let fiber = runtime.spawn(Effect::<i32, String>::never());
    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    let exit = fiber.interrupt();
    let cause = exit.cause().expect("must fail");
    assert_eq!(cause.interruptors(), vec![weft::FiberId::external()]);
}

#[test]
fn catch_all_does_not_absorb_interruption() {
    let runtime = test_runtime();
    let recovered = Arc::new(AtomicBool::new(false));

    let witness = Arc::clone(&recovered);
    let program: Effect<i32, String> = Effect::<i32, String>::never().catch_all(move |_| {
        witness.store(true, Ordering::SeqCst);
        Effect::succeed(0)
    });

    let fiber = runtime.spawn(program);
    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    let exit = fiber.interrupt();
    assert!(exit.is_interrupted());
    assert!(!recovered.load(Ordering::SeqCst));
}

#[test]
fn running_fiber_observes_interrupt_at_the_next_checkpoint() {
    fn spin_forever() -> Effect<(), Infallible> {
        Effect::suspend(spin_forever)
    }

    let runtime = test_runtime();
    let fiber = runtime.spawn(spin_forever());
    std::thread::sleep(Duration::from_millis(20));
    let exit = fiber.interrupt();
    assert!(exit.is_interrupted());
}
