//! Scenario tests driving effect descriptions through the runtime.

mod common;

use common::*;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft::{Effect, Env, Exit, FiberId};

#[test]
fn left_identity_of_sequencing() {
    let runtime = test_runtime();
    let chained: Effect<i32, String> = Effect::succeed(20).and_then(|x| Effect::succeed(x + 1));
    let direct: Effect<i32, String> = Effect::succeed(21);
    assert_eq!(runtime.run(chained), runtime.run(direct));
}

#[test]
fn building_an_effect_runs_nothing() {
    let ran = Arc::new(AtomicU32::new(0));
    let witness = Arc::clone(&ran);
    let program: Effect<(), Infallible> = Effect::sync(move || {
        witness.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let runtime = test_runtime();
    runtime.run(program).unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn fail_then_catch_all_recovers_typed_error() {
    let runtime = test_runtime();
    let program: Effect<String, String> = Effect::succeed(1)
        .and_then(|x| Effect::succeed(x + 1))
        .and_then(|_| Effect::fail("boom".to_string()))
        .catch_all(|e| Effect::succeed(format!("recovered:{e}")));
    assert_eq!(
        runtime.run(program).into_result().ok().as_deref(),
        Some("recovered:boom")
    );
}

#[test]
fn uncaught_failure_surfaces_the_cause() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::succeed(1)
        .and_then(|x| Effect::succeed(x + 1))
        .and_then(|_| Effect::fail("boom".to_string()));
    let exit = runtime.run(program);
    let cause = exit.cause().expect("must fail");
    assert_eq!(cause.failures(), vec![&"boom".to_string()]);
    assert!(!cause.died());
    assert!(!cause.interrupted());
}

#[test]
fn panicking_sync_becomes_a_defect() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::sync(|| panic!("kaboom"));
    let exit = runtime.run(program);
    let cause = exit.cause().expect("must fail");
    assert!(cause.died());
    assert_eq!(cause.defects()[0].message(), "kaboom");
}

#[test]
fn catch_all_does_not_absorb_defects() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::<i32, String>::sync(|| panic!("kaboom"))
        .catch_all(|_| Effect::succeed(0));
    let exit = runtime.run(program);
    assert!(exit.is_failure());
    assert!(exit.cause().expect("must fail").died());
}

#[test]
fn map_err_touches_only_the_typed_channel() {
    let runtime = test_runtime();
    let program: Effect<i32, usize> =
        Effect::<i32, String>::fail("boom".to_string()).map_err(|e| e.len());
    let exit = runtime.run(program);
    assert_eq!(exit.cause().expect("must fail").failures(), vec![&4]);
}

#[test]
fn fold_collapses_both_typed_channels() {
    let runtime = test_runtime();
    let failed: Effect<&'static str, Infallible> =
        Effect::<i32, String>::fail("nope".to_string()).fold(|_| "failed", |_| "ok");
    assert_eq!(runtime.run(failed).into_result().ok(), Some("failed"));

    let succeeded: Effect<&'static str, Infallible> =
        Effect::<i32, String>::succeed(3).fold(|_| "failed", |_| "ok");
    assert_eq!(runtime.run(succeeded).into_result().ok(), Some("ok"));
}

#[test]
fn exit_materializes_the_outcome() {
    let runtime = test_runtime();
    let program = Effect::<i32, String>::fail("boom".to_string()).exit();
    let exit: Exit<String, Exit<String, i32>> = runtime.run(program);
    let inner = exit.into_result().expect("outer must succeed");
    assert!(inner.is_failure());
}

#[test]
fn deep_and_then_chain_is_stack_safe() {
    let runtime = test_runtime();
    let mut program: Effect<u32, Infallible> = Effect::succeed(0);
    for _ in 0..50_000 {
        program = program.and_then(|x| Effect::succeed(x + 1));
    }
    assert_eq!(runtime.run(program).into_result().ok(), Some(50_000));
}

#[test]
fn async_effect_resumes_from_another_thread() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::async_effect(|resume| {
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            let _ = resume.succeed(42);
        });
    });
    assert_eq!(runtime.run(program).into_result().ok(), Some(42));
}

#[test]
fn async_effect_may_resume_synchronously() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::async_effect(|resume| {
        let _ = resume.succeed(7);
    });
    assert_eq!(runtime.run(program).into_result().ok(), Some(7));
}

#[test]
fn yield_now_preserves_sequencing() {
    let runtime = test_runtime();
    let program: Effect<i32, Infallible> = Effect::succeed(1)
        .and_then(|x| Effect::yield_now().map(move |()| x))
        .and_then(|x| Effect::succeed(x + 1));
    assert_eq!(runtime.run(program).into_result().ok(), Some(2));
}

#[test]
fn spinning_fiber_cannot_starve_a_single_worker() {
    fn spin_forever() -> Effect<(), Infallible> {
        Effect::suspend(|| spin_forever())
    }

    let runtime = single_worker_runtime();
    let spinner = runtime.spawn(spin_forever());
    let quick = runtime.spawn(Effect::<i32>::succeed(7));

    // The forced yield after the fairness budget lets the second fiber
    // through even though the first never suspends voluntarily.
    assert_eq!(quick.join().into_result().ok(), Some(7));
    assert!(spinner.interrupt().is_interrupted());
}

#[test]
fn fiber_ids_are_observable_and_distinct() {
    let runtime = test_runtime();
    let a = runtime.run(Effect::<FiberId, Infallible>::fiber_id());
    let b = runtime.run(Effect::<FiberId, Infallible>::fiber_id());
    let a = a.into_result().expect("must succeed");
    let b = b.into_result().expect("must succeed");
    assert_ne!(a, b);
}

#[derive(Debug)]
struct Greeter {
    greeting: &'static str,
}

#[test]
fn environment_is_visible_to_every_instruction() {
    let runtime = test_runtime();
    let env = Env::new().with(Greeter { greeting: "hello" });
    let lookup: Effect<Option<Arc<Greeter>>, String> = Effect::service();
    let program = lookup.and_then(|service| match service {
        Some(greeter) => Effect::succeed(greeter.greeting.to_string()),
        None => Effect::fail("missing service".to_string()),
    });
    assert_eq!(
        runtime.run_with_env(program, env).into_result().ok().as_deref(),
        Some("hello")
    );

    // Absent from an empty environment.
    let lookup: Effect<Option<Arc<Greeter>>, String> = Effect::service();
    let absent = lookup.map(|service| service.is_none());
    assert_eq!(runtime.run(absent).into_result().ok(), Some(true));
}

#[test]
fn fork_and_await_exit_round_trip() {
    let runtime = test_runtime();
    let program: Effect<i32, String> = Effect::succeed(20)
        .map(|x| x * 2)
        .fork()
        .and_then(|fiber| fiber.await_exit())
        .and_then(Effect::from_exit);
    assert_eq!(runtime.run(program).into_result().ok(), Some(40));
}

#[test]
fn forked_fiber_failure_is_visible_in_its_exit() {
    let runtime = test_runtime();
    let program: Effect<Exit<String, i32>, String> =
        Effect::<i32, String>::fail("child failed".to_string())
            .fork()
            .and_then(|fiber| fiber.await_exit());
    let child_exit = runtime.run(program).into_result().expect("parent succeeds");
    assert_eq!(
        child_exit.cause().expect("child failed").failures(),
        vec![&"child failed".to_string()]
    );
}

#[test]
fn on_exit_observes_without_changing_the_outcome() {
    let runtime = test_runtime();
    let seen = Arc::new(AtomicU32::new(0));
    let witness = Arc::clone(&seen);
    let program: Effect<i32, String> = Effect::succeed(5).on_exit(move |exit| {
        if exit.is_success() {
            witness.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert_eq!(runtime.run(program).into_result().ok(), Some(5));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
