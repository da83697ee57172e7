//! The effect description algebra.
//!
//! An [`Effect<A, E>`] is an immutable description of a computation that
//! may succeed with `A`, fail with a typed error `E`, die with a
//! [`Defect`], or be interrupted. Building and composing effects
//! performs no work; a [`Runtime`](crate::Runtime) interprets the
//! description on a fiber.
//!
//! # Channels
//!
//! Failure recovery is deliberately asymmetric:
//!
//! - [`catch_all`](Effect::catch_all) and [`fold`](Effect::fold) see
//!   *typed errors only*. A cause carrying only defects or interruption
//!   passes through them structurally unchanged.
//! - [`fold_cause_effect`](Effect::fold_cause_effect) sees the full
//!   [`Cause`] and is the deliberate way to observe defects and
//!   interruption.
//!
//! # Example
//!
//! ```
//! use weft::{Effect, Runtime};
//!
//! let runtime = Runtime::new();
//! let program: Effect<String, String> = Effect::succeed(1)
//!     .and_then(|x| Effect::succeed(x + 1))
//!     .and_then(|_| Effect::fail("boom".to_string()))
//!     .catch_all(|e| Effect::succeed(format!("recovered:{e}")));
//! assert_eq!(runtime.run(program).into_result().ok().as_deref(), Some("recovered:boom"));
//! ```

pub(crate) mod primitive;

use crate::runtime::fiber::ResumeInner;
use crate::runtime::Fiber;
use crate::scope::{Scope, ScopeExit};
use crate::types::cause::{self, Cause, ErasedCause};
use crate::types::defect::Defect;
use crate::types::exit::Exit;
use crate::types::flags::{RuntimeFlags, RuntimeFlagsPatch};
use crate::types::id::FiberId;
use crate::types::Trace;
use core::fmt;
use primitive::{with_typed, Primitive};
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Arc;

/// Widens a cause that provably carries no typed failure.
pub(crate) fn widen_cause<E>(cause: Cause<Infallible>) -> Cause<E> {
    cause.map(|never| match never {})
}

/// An immutable description of a computation.
///
/// `A` is the success type, `E` the typed-error type (defaulting to
/// [`Infallible`] for effects that cannot fail with a typed error).
/// Effects are consumed by execution and by composition; composition
/// wraps, it never mutates.
#[must_use = "effects describe a computation but do nothing until run"]
pub struct Effect<A, E = Infallible> {
    primitive: Primitive,
    _types: PhantomData<fn() -> (A, E)>,
}

impl<A, E> fmt::Debug for Effect<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Effect").field(&self.primitive).finish()
    }
}

impl<A, E> Effect<A, E>
where
    A: Send + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn from_primitive(primitive: Primitive) -> Self {
        Self {
            primitive,
            _types: PhantomData,
        }
    }

    pub(crate) fn into_primitive(self) -> Primitive {
        self.primitive
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// An effect that succeeds with an already-computed value.
    pub fn succeed(value: A) -> Self {
        Self::from_primitive(Primitive::SucceedNow(Box::new(value)))
    }

    /// An effect that computes its value by running a side effect when
    /// interpreted.
    ///
    /// A panic in `f` is caught by the interpreter and surfaces as a
    /// defect in the cause, never as an unwinding panic.
    pub fn sync(f: impl FnOnce() -> A + Send + 'static) -> Self {
        Self::from_primitive(Primitive::Sync(Box::new(move || Box::new(f()))))
    }

    /// An effect that fails with a typed error.
    #[track_caller]
    pub fn fail(error: E) -> Self {
        let trace = Trace::capture();
        Self::from_primitive(Primitive::Fail(Box::new(move || {
            Cause::Fail(crate::types::ErrorPayload::new(error), trace)
        })))
    }

    /// An effect that fails with a lazily-built typed error.
    #[track_caller]
    pub fn fail_with(f: impl FnOnce() -> E + Send + 'static) -> Self {
        let trace = Trace::capture();
        Self::from_primitive(Primitive::Fail(Box::new(move || {
            Cause::Fail(crate::types::ErrorPayload::new(f()), trace)
        })))
    }

    /// An effect that fails with the given cause.
    pub fn fail_cause(cause: Cause<E>) -> Self {
        Self::from_primitive(Primitive::fail_now(cause::erase(cause)))
    }

    /// An effect that dies with a defect.
    #[track_caller]
    pub fn die(defect: Defect) -> Self {
        Self::fail_cause(Cause::halt(defect))
    }

    /// Lifts a `Result` into an effect.
    #[track_caller]
    pub fn from_result(result: Result<A, E>) -> Self {
        match result {
            Ok(a) => Self::succeed(a),
            Err(e) => Self::fail(e),
        }
    }

    /// Lifts an `Exit` back into an effect that settles the same way.
    pub fn from_exit(exit: Exit<E, A>) -> Self {
        match exit {
            Exit::Success(a) => Self::succeed(a),
            Exit::Failure(cause) => Self::fail_cause(cause),
        }
    }

    /// Defers construction of an effect until interpretation.
    pub fn suspend(f: impl FnOnce() -> Self + Send + 'static) -> Self {
        Self::from_primitive(Primitive::OnSuccess {
            effect: Box::new(Primitive::succeed_unit()),
            on_success: Box::new(move |_| f().into_primitive()),
        })
    }

    /// An effect that suspends the fiber until the callback handed to
    /// `register` is used to resume it.
    ///
    /// `register` is invoked exactly once. Dropping the [`Resume`]
    /// without calling it parks the fiber until it is interrupted.
    pub fn async_effect(register: impl FnOnce(Resume<A, E>) + Send + 'static) -> Self {
        Self::from_primitive(Primitive::Async {
            register: Box::new(move |inner| {
                register(Resume {
                    inner,
                    _types: PhantomData,
                });
            }),
            blocking_on: None,
        })
    }

    /// Like [`async_effect`](Self::async_effect), recording the fiber
    /// this suspension is waiting on for diagnostics.
    pub fn async_effect_blocking_on(
        blocking_on: FiberId,
        register: impl FnOnce(Resume<A, E>) + Send + 'static,
    ) -> Self {
        Self::from_primitive(Primitive::Async {
            register: Box::new(move |inner| {
                register(Resume {
                    inner,
                    _types: PhantomData,
                });
            }),
            blocking_on: Some(blocking_on),
        })
    }

    /// An effect that never completes on its own. It settles only
    /// through interruption.
    pub fn never() -> Self {
        Self::from_primitive(Primitive::Async {
            register: Box::new(|_resume| {}),
            blocking_on: None,
        })
    }

    // =========================================================================
    // Sequencing
    // =========================================================================

    /// Maps the success value.
    pub fn map<B: Send + 'static>(self, f: impl FnOnce(A) -> B + Send + 'static) -> Effect<B, E> {
        Effect::from_primitive(Primitive::OnSuccess {
            effect: Box::new(self.primitive),
            on_success: Box::new(move |value| {
                with_typed::<A>(value, |a| Primitive::SucceedNow(Box::new(f(a))))
            }),
        })
    }

    /// Sequential composition: runs `self`, feeding its success value to
    /// `f`.
    pub fn and_then<B: Send + 'static>(
        self,
        f: impl FnOnce(A) -> Effect<B, E> + Send + 'static,
    ) -> Effect<B, E> {
        Effect::from_primitive(Primitive::OnSuccess {
            effect: Box::new(self.primitive),
            on_success: Box::new(move |value| with_typed::<A>(value, |a| f(a).into_primitive())),
        })
    }

    /// Discards the success value.
    pub fn as_unit(self) -> Effect<(), E> {
        self.map(|_| ())
    }

    // =========================================================================
    // Error channel
    // =========================================================================

    /// Maps the typed-error channel, leaving defects and interruption
    /// untouched.
    pub fn map_err<E2: Send + Sync + 'static>(
        self,
        mut f: impl FnMut(E) -> E2 + Send + 'static,
    ) -> Effect<A, E2> {
        Effect::from_primitive(Primitive::OnSuccessAndFailure {
            effect: Box::new(self.primitive),
            on_failure: Box::new(move |erased| {
                Primitive::fail_now(cause::map_typed::<E, E2, _>(erased, &mut f))
            }),
            on_success: Box::new(Primitive::SucceedNow),
        })
    }

    /// Recovers from typed failures only.
    ///
    /// The first typed failure (depth-first) is fed to `f`; a cause
    /// carrying only defects or interruption is re-raised structurally
    /// unchanged, so cancellation and bugs are never absorbed by
    /// ordinary recovery.
    pub fn catch_all<E2: Send + Sync + 'static>(
        self,
        f: impl FnOnce(E) -> Effect<A, E2> + Send + 'static,
    ) -> Effect<A, E2> {
        Effect::from_primitive(Primitive::OnSuccessAndFailure {
            effect: Box::new(self.primitive),
            on_failure: Box::new(move |erased: ErasedCause| match erased.failure_or_cause() {
                Ok(payload) => match payload.downcast::<E>() {
                    Ok(e) => f(e).into_primitive(),
                    Err(payload) => Primitive::fail_now(Cause::halt(Defect::new(format!(
                        "error payload had unexpected type {}",
                        payload.type_name()
                    )))),
                },
                Err(rest) => Primitive::fail_now(rest),
            }),
            on_success: Box::new(Primitive::SucceedNow),
        })
    }

    /// Folds the typed channels into a single value. Defects and
    /// interruption pass through unrecovered.
    pub fn fold<B: Send + 'static, E2: Send + Sync + 'static>(
        self,
        on_failure: impl FnOnce(E) -> B + Send + 'static,
        on_success: impl FnOnce(A) -> B + Send + 'static,
    ) -> Effect<B, E2> {
        self.map(on_success)
            .catch_all(move |e| Effect::succeed(on_failure(e)))
    }

    /// Folds over the full cause and the success value, producing
    /// effects. This is the deliberate way to observe defects and
    /// interruption.
    pub fn fold_cause_effect<B: Send + 'static, E2: Send + Sync + 'static>(
        self,
        on_failure: impl FnOnce(Cause<E>) -> Effect<B, E2> + Send + 'static,
        on_success: impl FnOnce(A) -> Effect<B, E2> + Send + 'static,
    ) -> Effect<B, E2> {
        Effect::from_primitive(Primitive::OnSuccessAndFailure {
            effect: Box::new(self.primitive),
            on_failure: Box::new(move |erased| on_failure(cause::reify::<E>(erased)).into_primitive()),
            on_success: Box::new(move |value| {
                with_typed::<A>(value, |a| on_success(a).into_primitive())
            }),
        })
    }

    /// Folds over the full cause and the success value.
    pub fn fold_cause<B: Send + 'static, E2: Send + Sync + 'static>(
        self,
        on_failure: impl FnOnce(Cause<E>) -> B + Send + 'static,
        on_success: impl FnOnce(A) -> B + Send + 'static,
    ) -> Effect<B, E2> {
        self.fold_cause_effect(
            move |cause| Effect::succeed(on_failure(cause)),
            move |a| Effect::succeed(on_success(a)),
        )
    }

    /// Materializes this effect's outcome as an [`Exit`] value.
    ///
    /// Interruption is captured into the exit like any other cause; a
    /// still-pending interrupt is re-observed at the fiber's next
    /// interruptible checkpoint.
    pub fn exit<E2: Send + Sync + 'static>(self) -> Effect<Exit<E, A>, E2> {
        self.fold_cause_effect(
            |cause| Effect::succeed(Exit::Failure(cause)),
            |a| Effect::succeed(Exit::Success(a)),
        )
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Makes this effect uninterruptible while handing `f` a restorer
    /// for the previous interrupt status.
    ///
    /// This is the building block for cleanup combinators: the mask
    /// keeps the cleanup path (and the glue around it) safe from
    /// interruption, while `restore` re-exposes the caller's
    /// interruptibility to the wrapped sub-effect so a long-running
    /// body stays cancellable.
    pub fn uninterruptible_mask(
        f: impl FnOnce(InterruptStatusRestore) -> Self + Send + 'static,
    ) -> Self {
        Self::from_primitive(Primitive::UpdateRuntimeFlags {
            patch: RuntimeFlagsPatch::disable(RuntimeFlags::INTERRUPTION),
            region: Some(Box::new(move |previous| {
                f(InterruptStatusRestore { previous }).into_primitive()
            })),
        })
    }

    /// Runs `finalizer` after `self` settles, on success, failure, and
    /// interruption alike. The finalizer runs uninterruptibly; its
    /// failure is sequenced onto the primary cause with
    /// [`Cause::then`], never dropped.
    pub fn ensuring(self, finalizer: Effect<(), Infallible>) -> Self {
        Self::uninterruptible_mask(move |restore| {
            restore.apply(self).exit().and_then(move |exit| {
                finalizer.exit().and_then(move |fin_exit| match fin_exit {
                    Exit::Success(()) => Effect::from_exit(exit),
                    Exit::Failure(fin_cause) => match exit {
                        Exit::Success(_) => Effect::fail_cause(widen_cause(fin_cause)),
                        Exit::Failure(primary) => {
                            Effect::fail_cause(primary.then(widen_cause(fin_cause)))
                        }
                    },
                })
            })
        })
    }

    /// Observes the settled [`Exit`] without changing it.
    ///
    /// The observation runs even when the fiber is being interrupted.
    pub fn on_exit(self, f: impl FnOnce(&Exit<E, A>) + Send + 'static) -> Self {
        Self::uninterruptible_mask(move |restore| {
            restore.apply(self).exit().and_then(move |exit| {
                Effect::sync(move || {
                    f(&exit);
                    exit
                })
                .and_then(Effect::from_exit)
            })
        })
    }

    // =========================================================================
    // Interruption regions
    // =========================================================================

    /// Marks this effect as an uninterruptible region: once entered it
    /// always runs to completion, and a pending interrupt is observed
    /// only after it ends.
    pub fn uninterruptible(self) -> Self {
        Self::from_primitive(Primitive::UpdateRuntimeFlags {
            patch: RuntimeFlagsPatch::disable(RuntimeFlags::INTERRUPTION),
            region: Some(Box::new(move |_previous| self.into_primitive())),
        })
    }

    /// Marks this effect as an interruptible region inside a wider
    /// uninterruptible one.
    pub fn interruptible(self) -> Self {
        Self::from_primitive(Primitive::UpdateRuntimeFlags {
            patch: RuntimeFlagsPatch::enable(RuntimeFlags::INTERRUPTION),
            region: Some(Box::new(move |_previous| self.into_primitive())),
        })
    }

    // =========================================================================
    // Fibers and scopes
    // =========================================================================

    /// Starts this effect on a new fiber of the same executor and
    /// succeeds immediately with its handle.
    ///
    /// The child inherits the parent's environment and runtime flags.
    /// Forked fibers are unsupervised: the parent's exit does not
    /// interrupt them.
    pub fn fork<E2: Send + Sync + 'static>(self) -> Effect<Fiber<A, E>, E2> {
        Effect::from_primitive(Primitive::Stateful(Box::new(move |ctx| {
            let record = ctx.spawn_child(self.into_primitive());
            Primitive::SucceedNow(Box::new(Fiber::<A, E>::from_record(record)))
        })))
    }

    /// Runs `f` with a fresh [`Scope`], then releases every registered
    /// finalizer exactly once, whether the body succeeds, fails, or is
    /// interrupted. Finalizer failures are aggregated with
    /// [`Cause::both`] and sequenced onto the primary cause with
    /// [`Cause::then`].
    ///
    /// The body keeps the caller's interruptibility; the close and the
    /// glue around it are masked so an in-flight interrupt cannot skip
    /// the finalizers.
    pub fn scoped(f: impl FnOnce(Scope) -> Self + Send + 'static) -> Self {
        Self::uninterruptible_mask(move |restore| {
            Effect::<Scope, E>::sync(Scope::new).and_then(move |scope| {
                let closer = scope.clone();
                restore
                    .apply(f(scope))
                    .exit()
                    .and_then(move |exit: Exit<E, A>| {
                        let scope_exit: ScopeExit = match &exit {
                            Exit::Success(_) => Exit::Success(()),
                            Exit::Failure(cause) => Exit::Failure(cause.structure()),
                        };
                        closer
                            .close(scope_exit)
                            .exit()
                            .and_then(move |close_exit| match close_exit {
                                Exit::Success(()) => Effect::from_exit(exit),
                                Exit::Failure(fin_cause) => {
                                    let fin: Cause<E> = widen_cause(fin_cause);
                                    match exit {
                                        Exit::Success(_) => Effect::fail_cause(fin),
                                        Exit::Failure(primary) => {
                                            Effect::fail_cause(primary.then(fin))
                                        }
                                    }
                                }
                            })
                    })
            })
        })
    }
}

impl<A: Send + 'static> Effect<A, Infallible> {
    /// Widens the error channel of an effect that cannot fail with a
    /// typed error.
    pub fn widen<E2: Send + Sync + 'static>(self) -> Effect<A, E2> {
        Effect::from_primitive(self.primitive)
    }
}

impl<E: Send + Sync + 'static> Effect<(), E> {
    /// The unit effect.
    pub fn unit() -> Self {
        Self::from_primitive(Primitive::succeed_unit())
    }

    /// A voluntary fairness checkpoint: suspends the fiber and
    /// immediately reschedules it.
    pub fn yield_now() -> Self {
        Self::from_primitive(Primitive::YieldNow)
    }

    /// Patches the fiber's runtime flags for the remainder of the fiber.
    ///
    /// Most callers want the region forms
    /// [`uninterruptible`](Effect::uninterruptible) and
    /// [`interruptible`](Effect::interruptible), which restore the
    /// previous flags when the region exits.
    pub fn update_runtime_flags(patch: RuntimeFlagsPatch) -> Self {
        Self::from_primitive(Primitive::UpdateRuntimeFlags {
            patch,
            region: None,
        })
    }
}

impl<E: Send + Sync + 'static> Effect<FiberId, E> {
    /// Succeeds with the identifier of the fiber running this effect.
    pub fn fiber_id() -> Self {
        Self::from_primitive(Primitive::Stateful(Box::new(|ctx| {
            Primitive::SucceedNow(Box::new(ctx.fiber_id()))
        })))
    }
}

impl<E: Send + Sync + 'static> Effect<RuntimeFlags, E> {
    /// Succeeds with the fiber's current runtime flags.
    pub fn runtime_flags() -> Self {
        Self::from_primitive(Primitive::Stateful(Box::new(|ctx| {
            Primitive::SucceedNow(Box::new(ctx.flags()))
        })))
    }
}

impl<T, E> Effect<Option<Arc<T>>, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Looks up a service of type `T` in the fiber's environment.
    pub fn service() -> Self {
        Self::from_primitive(Primitive::Stateful(Box::new(|ctx| {
            Primitive::SucceedNow(Box::new(ctx.env().get::<T>()))
        })))
    }
}

/// Restores the interrupt status saved by
/// [`Effect::uninterruptible_mask`].
#[derive(Debug, Clone, Copy)]
pub struct InterruptStatusRestore {
    previous: RuntimeFlags,
}

impl InterruptStatusRestore {
    /// Wraps `effect` in a region carrying the interrupt status the
    /// surrounding mask replaced.
    pub fn apply<B, E2>(&self, effect: Effect<B, E2>) -> Effect<B, E2>
    where
        B: Send + 'static,
        E2: Send + Sync + 'static,
    {
        if self.previous.interruption() {
            effect.interruptible()
        } else {
            effect.uninterruptible()
        }
    }
}

/// The resume handle passed to [`Effect::async_effect`] registrations.
///
/// The handle may be sent to another thread and used exactly once; the
/// first resolution of the suspension wins, so a resume racing an
/// interrupt is a no-op for whichever arrives second. All methods return
/// whether this call was the one that resumed the fiber.
pub struct Resume<A, E> {
    inner: ResumeInner,
    _types: PhantomData<fn(A, E)>,
}

impl<A, E> fmt::Debug for Resume<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resume").finish_non_exhaustive()
    }
}

impl<A, E> Resume<A, E>
where
    A: Send + 'static,
    E: Send + Sync + 'static,
{
    /// Resumes the fiber with a success value.
    pub fn succeed(self, value: A) -> bool {
        self.inner.resume(Primitive::SucceedNow(Box::new(value)))
    }

    /// Resumes the fiber with a typed failure.
    #[track_caller]
    pub fn fail(self, error: E) -> bool {
        let trace = Trace::capture();
        self.inner.resume(Primitive::Fail(Box::new(move || {
            Cause::Fail(crate::types::ErrorPayload::new(error), trace)
        })))
    }

    /// Resumes the fiber with a failure cause.
    pub fn fail_cause(self, cause: Cause<E>) -> bool {
        self.inner.resume(Primitive::fail_now(cause::erase(cause)))
    }

    /// Resumes the fiber with an arbitrary effect to continue with.
    pub fn complete(self, effect: Effect<A, E>) -> bool {
        self.inner.resume(effect.into_primitive())
    }
}
