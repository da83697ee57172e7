//! Scope and finalizer-registry conformance: ordering, at-most-once
//! release, late registration, and failure aggregation.

mod common;

use common::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weft::{Effect, ExecutionStrategy, Exit, FiberStatus, ReleaseMap, Runtime, Scope};

fn record(log: &Arc<Mutex<Vec<&'static str>>>, entry: &'static str) -> Effect<(), Infallible> {
    let log = Arc::clone(log);
    Effect::sync(move || {
        log.lock().expect("test log").push(entry);
    })
}

#[test]
fn finalizers_release_in_reverse_registration_order() {
    let runtime = test_runtime();
    let log = Arc::new(Mutex::new(Vec::new()));

    let order = Arc::clone(&log);
    let program: Effect<(), String> = Effect::scoped(move |scope| {
        let f1 = record(&order, "f1");
        let f2 = record(&order, "f2");
        let f3 = record(&order, "f3");
        let second = scope.clone();
        let third = scope.clone();
        scope
            .add_finalizer(move |_| f1)
            .and_then(move |_| second.add_finalizer(move |_| f2))
            .and_then(move |_| third.add_finalizer(move |_| f3))
            .widen()
            .as_unit()
    });

    runtime.run(program).into_result().expect("must succeed");
    assert_eq!(*log.lock().expect("test log"), vec!["f3", "f2", "f1"]);
}

#[test]
fn late_registration_after_close_runs_immediately() {
    let runtime = test_runtime();
    let invoked = Arc::new(AtomicU32::new(0));

    let map = ReleaseMap::new();
    let late = Arc::clone(&invoked);
    let release = map.release_all(Exit::Success(()), ExecutionStrategy::Sequential);
    let map_for_add = map.clone();
    let program = release.and_then(move |()| {
        map_for_add.add(move |exit| {
            let seen_success = exit.is_success();
            let late = Arc::clone(&late);
            Effect::sync(move || {
                assert!(seen_success);
                late.fetch_add(1, Ordering::SeqCst);
            })
        })
    });

    let key = runtime.run(program).into_result().expect("must succeed");
    assert!(key.is_spent());
    assert_eq!(invoked.load(Ordering::SeqCst), 1);

    // The finalizer was never stored: closing again releases nothing.
    let again = map.release_all(Exit::Success(()), ExecutionStrategy::Sequential);
    runtime.run(again).into_result().expect("must succeed");
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
}

#[test]
fn release_by_key_is_at_most_once() {
    let runtime = test_runtime();
    let invoked = Arc::new(AtomicU32::new(0));

    let map = ReleaseMap::new();
    let witness = Arc::clone(&invoked);
    let map_release = map.clone();
    let program = map
        .add(move |_| {
            let witness = Arc::clone(&witness);
            Effect::sync(move || {
                witness.fetch_add(1, Ordering::SeqCst);
            })
        })
        .and_then(move |key| {
            let second = map_release.release(key, Exit::Success(()));
            map_release
                .release(key, Exit::Success(()))
                .and_then(move |()| second)
        });

    runtime.run(program).into_result().expect("must succeed");
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
}

#[test]
fn release_all_is_idempotent() {
    let runtime = test_runtime();
    let invoked = Arc::new(AtomicU32::new(0));

    let map = ReleaseMap::new();
    let witness = Arc::clone(&invoked);
    let closer = map.clone();
    let again = map.clone();
    let program = map
        .add(move |_| {
            let witness = Arc::clone(&witness);
            Effect::sync(move || {
                witness.fetch_add(1, Ordering::SeqCst);
            })
        })
        .and_then(move |_key| closer.release_all(Exit::Success(()), ExecutionStrategy::Sequential))
        .and_then(move |()| again.release_all(Exit::Success(()), ExecutionStrategy::Sequential));

    runtime.run(program).into_result().expect("must succeed");
    assert_eq!(invoked.load(Ordering::SeqCst), 1);
}

#[test]
fn failing_finalizer_is_merged_after_the_primary_cause() {
    let runtime = test_runtime();

    let program: Effect<i32, String> = Effect::scoped(move |scope| {
        scope
            .add_finalizer(|_| Effect::sync(|| panic!("cleanup bug")))
            .widen()
            .and_then(|_| Effect::fail("boom".to_string()))
    });

    let exit = runtime.run(program);
    let cause = exit.cause().expect("must fail");
    assert_eq!(cause.failures(), vec![&"boom".to_string()]);
    assert!(cause.died());
    assert_eq!(cause.defects()[0].message(), "cleanup bug");
}

#[test]
fn finalizer_failure_alone_fails_a_successful_scope() {
    let runtime = test_runtime();

    let program: Effect<i32, String> = Effect::scoped(move |scope| {
        scope
            .add_finalizer(|_| Effect::sync(|| panic!("cleanup bug")))
            .widen()
            .map(|_| 42)
    });

    let exit = runtime.run(program);
    let cause = exit.cause().expect("must fail");
    assert!(!cause.failed());
    assert!(cause.died());
}

#[test]
fn one_failing_finalizer_does_not_stop_the_others() {
    let runtime = test_runtime();
    let survivors = Arc::new(AtomicU32::new(0));

    let first = Arc::clone(&survivors);
    let second = Arc::clone(&survivors);
    let program: Effect<(), String> = Effect::scoped(move |scope| {
        let middle_scope = scope.clone();
        let last_scope = scope.clone();
        scope
            .add_finalizer(move |_| {
                let first = Arc::clone(&first);
                Effect::sync(move || {
                    first.fetch_add(1, Ordering::SeqCst);
                })
            })
            .and_then(move |_| {
                middle_scope.add_finalizer(|_| Effect::sync(|| panic!("middle failed")))
            })
            .and_then(move |_| {
                last_scope.add_finalizer(move |_| {
                    let second = Arc::clone(&second);
                    Effect::sync(move || {
                        second.fetch_add(1, Ordering::SeqCst);
                    })
                })
            })
            .widen()
            .as_unit()
    });

    let exit = runtime.run(program);
    assert!(exit.is_failure());
    assert_eq!(survivors.load(Ordering::SeqCst), 2);
}

#[test]
fn finalizers_observe_how_the_scope_ended() {
    let runtime = test_runtime();
    let saw_failure = Arc::new(AtomicBool::new(false));

    let witness = Arc::clone(&saw_failure);
    let program: Effect<i32, String> = Effect::scoped(move |scope| {
        scope
            .add_finalizer(move |exit| {
                let failed = exit.is_failure() && !exit.is_interrupted();
                let witness = Arc::clone(&witness);
                Effect::sync(move || {
                    witness.store(failed, Ordering::SeqCst);
                })
            })
            .widen()
            .and_then(|_| Effect::fail("boom".to_string()))
    });

    assert!(runtime.run(program).is_failure());
    assert!(saw_failure.load(Ordering::SeqCst));
}

#[test]
fn acquire_release_frees_the_resource_on_success_and_failure() {
    let runtime = test_runtime();
    let released = Arc::new(AtomicU32::new(0));

    let on_success = Arc::clone(&released);
    let ok: Effect<u32, String> = Effect::scoped(move |scope| {
        let release = Arc::clone(&on_success);
        scope.acquire_release(Effect::succeed(7_u32), move |resource| {
            Effect::sync(move || {
                release.fetch_add(resource, Ordering::SeqCst);
            })
        })
    });
    assert_eq!(runtime.run(ok).into_result().ok(), Some(7));
    assert_eq!(released.load(Ordering::SeqCst), 7);

    let on_failure = Arc::clone(&released);
    let failing: Effect<u32, String> = Effect::scoped(move |scope| {
        let release = Arc::clone(&on_failure);
        scope
            .acquire_release(Effect::succeed(1_u32), move |resource| {
                Effect::sync(move || {
                    release.fetch_add(resource, Ordering::SeqCst);
                })
            })
            .and_then(|_| Effect::fail("use failed".to_string()))
    });
    assert!(runtime.run(failing).is_failure());
    assert_eq!(released.load(Ordering::SeqCst), 8);
}

#[test]
fn interruption_closes_the_scope() {
    let runtime = test_runtime();
    let released = Arc::new(AtomicBool::new(false));
    let saw_interrupt = Arc::new(AtomicBool::new(false));

    let release_witness = Arc::clone(&released);
    let interrupt_witness = Arc::clone(&saw_interrupt);
    let program: Effect<i32, String> = Effect::scoped(move |scope| {
        scope
            .add_finalizer(move |exit| {
                let interrupted = exit.is_interrupted();
                let release_witness = Arc::clone(&release_witness);
                let interrupt_witness = Arc::clone(&interrupt_witness);
                Effect::sync(move || {
                    release_witness.store(true, Ordering::SeqCst);
                    interrupt_witness.store(interrupted, Ordering::SeqCst);
                })
            })
            .widen()
            .and_then(|_| Effect::never())
    });

    let fiber = runtime.spawn(program);
    wait_until("fiber to suspend", Duration::from_secs(2), || {
        matches!(fiber.status(), FiberStatus::Suspended { .. })
    });

    let exit = fiber.interrupt();
    assert!(exit.is_interrupted());
    assert!(released.load(Ordering::SeqCst));
    assert!(saw_interrupt.load(Ordering::SeqCst));
}

#[test]
fn concurrent_strategy_runs_every_finalizer() {
    init_logging();
    let runtime = Runtime::builder()
        .worker_threads(2)
        .default_strategy(ExecutionStrategy::Concurrent)
        .build();
    let invoked = Arc::new(AtomicU32::new(0));

    let witness = Arc::clone(&invoked);
    let program: Effect<(), String> = Effect::scoped(move |scope| {
        let mut chain: Effect<(), String> = Effect::unit();
        for _ in 0..3 {
            let scope = scope.clone();
            let witness = Arc::clone(&witness);
            chain = chain.and_then(move |()| {
                scope
                    .add_finalizer(move |_| {
                        Effect::sync(move || {
                            witness.fetch_add(1, Ordering::SeqCst);
                        })
                    })
                    .widen()
                    .as_unit()
            });
        }
        chain
    });

    runtime.run(program).into_result().expect("must succeed");
    assert_eq!(invoked.load(Ordering::SeqCst), 3);
}

#[test]
fn manual_scope_close_uses_the_explicit_strategy() {
    let runtime = test_runtime();
    let log = Arc::new(Mutex::new(Vec::new()));

    let scope = Scope::new();
    let a = record(&log, "a");
    let b = record(&log, "b");
    let closer = scope.clone();
    let program: Effect<(), Infallible> = scope
        .add_finalizer(move |_| a)
        .and_then(move |_| scope.add_finalizer(move |_| b))
        .and_then(move |_| closer.close_with(Exit::Success(()), ExecutionStrategy::Sequential));

    runtime.run(program).into_result().expect("must succeed");
    assert_eq!(*log.lock().expect("test log"), vec!["b", "a"]);
}
