//! The fiber record, interpreter loop, and typed fiber handle.
//!
//! A fiber interprets one effect description to exactly one
//! [`Exit`]. The interpreter is a loop over an explicit continuation
//! stack: program depth lives on the heap, never on the host call
//! stack. A fiber is driven by at most one worker at a time; the phase
//! transition `Ready -> Running` is performed under the state cell's
//! lock, so a stale wakeup (the fiber is already running, suspended, or
//! done) is a no-op.
//!
//! # Suspension and resumption
//!
//! At an `Async` instruction the fiber saves its continuation stack and
//! flags, moves to `Suspended`, and hands a [`ResumeInner`] to the
//! registration callback. Each suspension increments an epoch; a resume
//! carrying a stale epoch is ignored. Interrupt delivery to a suspended
//! interruptible fiber advances the epoch itself, so exactly one of
//! {external resume, interrupt} wins the suspension.
//!
//! # Interruption
//!
//! Interruption is cooperative. The interpreter checks the pending flag
//! before dispatching each instruction and when a flag-restore frame
//! re-enables interruption; an uninterruptible region therefore always
//! runs to completion once entered. Interruption is sticky: recovering
//! from the interrupt cause does not clear the pending flag, and the
//! next interruptible checkpoint raises it again.

use crate::effect::primitive::{BoxedValue, ErasedExit, FailureCont, Primitive, SuccessCont};
use crate::effect::Effect;
use crate::runtime::executor::ExecutorShared;
use crate::scope::ExecutionStrategy;
use crate::tracing_compat::{debug, trace};
use crate::types::cause::{self, Cause, ErasedCause};
use crate::types::defect::Defect;
use crate::types::env::Env;
use crate::types::exit::Exit;
use crate::types::flags::RuntimeFlags;
use crate::types::id::FiberId;
use core::fmt;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An observer invoked with the fiber's erased exit.
pub(crate) type Observer = Box<dyn FnOnce(&ErasedExit) + Send>;

/// One saved continuation.
enum Frame {
    /// Awaits a success value; skipped during failure unwinding.
    OnSuccess(SuccessCont),
    /// Awaits either channel.
    Fold {
        on_failure: FailureCont,
        on_success: SuccessCont,
    },
    /// Restores the runtime flags saved when a flag region was entered.
    RestoreFlags(RuntimeFlags),
}

type FrameStack = SmallVec<[Frame; 8]>;

/// Where the interpreter is between instructions.
enum Step {
    Effect(Primitive),
    Value(BoxedValue),
    Failure(ErasedCause),
}

/// The lifecycle phase of a fiber.
enum Phase {
    /// Runnable; holds the next instruction to interpret.
    Ready(Primitive),
    /// A worker currently owns the continuation stack.
    Running,
    /// Parked at an `Async` instruction.
    Suspended { blocking_on: Option<FiberId> },
    /// Settled.
    Done,
}

/// The externally observable status of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    /// The fiber is runnable or currently executing.
    Running,
    /// The fiber is parked waiting for a resume callback.
    Suspended {
        /// The fiber this suspension is waiting on, if known.
        blocking_on: Option<FiberId>,
    },
    /// The fiber has settled with an exit.
    Done,
}

/// Mutable fiber state, guarded by the record's mutex.
struct FiberCell {
    phase: Phase,
    flags: RuntimeFlags,
    stack: FrameStack,
    epoch: u64,
    interrupters: Vec<FiberId>,
    observers: Vec<Observer>,
    exit: Option<ErasedExit>,
    exit_taken: bool,
}

/// The runtime record of one fiber.
pub(crate) struct FiberRecord {
    id: FiberId,
    executor: Arc<ExecutorShared>,
    env: Env,
    /// Mirror of "interrupters is non-empty", readable without the lock.
    interrupted: AtomicBool,
    cell: Mutex<FiberCell>,
    done: Condvar,
}

impl FiberRecord {
    pub(crate) fn new(
        executor: Arc<ExecutorShared>,
        env: Env,
        flags: RuntimeFlags,
        primitive: Primitive,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: FiberId::next(),
            executor,
            env,
            interrupted: AtomicBool::new(false),
            cell: Mutex::new(FiberCell {
                phase: Phase::Ready(primitive),
                flags,
                stack: SmallVec::new(),
                epoch: 0,
                interrupters: Vec::new(),
                observers: Vec::new(),
                exit: None,
                exit_taken: false,
            }),
            done: Condvar::new(),
        })
    }

    pub(crate) fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) fn status(&self) -> FiberStatus {
        let cell = self.cell.lock();
        match cell.phase {
            Phase::Ready(_) | Phase::Running => FiberStatus::Running,
            Phase::Suspended { blocking_on } => FiberStatus::Suspended { blocking_on },
            Phase::Done => FiberStatus::Done,
        }
    }

    /// Runs one fairness slice of this fiber.
    ///
    /// Returns without effect on a stale wakeup.
    pub(crate) fn run(self: &Arc<Self>) {
        let (program, mut stack, mut flags) = {
            let mut cell = self.cell.lock();
            match std::mem::replace(&mut cell.phase, Phase::Running) {
                Phase::Ready(primitive) => {
                    (primitive, std::mem::take(&mut cell.stack), cell.flags)
                }
                other => {
                    cell.phase = other;
                    return;
                }
            }
        };

        let budget = self.executor.config().yield_budget.max(1);
        let mut ops: u32 = 0;
        let mut step = Step::Effect(program);

        loop {
            match step {
                Step::Effect(primitive) => {
                    // Interruption checkpoint: the remaining program is
                    // discarded and the stack unwinds with the interrupt
                    // cause.
                    if flags.interruptible() && self.interrupted.load(Ordering::Acquire) {
                        step = Step::Failure(self.interrupt_cause());
                        continue;
                    }

                    // Fairness: at least one instruction runs per slice.
                    ops += 1;
                    if ops > budget && flags.cooperative_yielding() {
                        self.park_ready(primitive, stack, flags);
                        self.executor.schedule(Arc::clone(self));
                        return;
                    }

                    if flags.op_tracing() {
                        trace!(fiber = %self.id, op = primitive.tag(), "dispatch");
                    }

                    match primitive {
                        Primitive::SucceedNow(value) => step = Step::Value(value),
                        Primitive::Sync(thunk) => {
                            step = match catch_unwind(AssertUnwindSafe(move || thunk())) {
                                Ok(value) => Step::Value(value),
                                Err(payload) => Step::Failure(Cause::halt(Defect::from_panic(
                                    payload.as_ref(),
                                ))),
                            };
                        }
                        Primitive::Fail(thunk) => {
                            step = match catch_unwind(AssertUnwindSafe(move || thunk())) {
                                Ok(built) => Step::Failure(built),
                                Err(payload) => Step::Failure(Cause::halt(Defect::from_panic(
                                    payload.as_ref(),
                                ))),
                            };
                        }
                        Primitive::OnSuccess { effect, on_success } => {
                            stack.push(Frame::OnSuccess(on_success));
                            step = Step::Effect(*effect);
                        }
                        Primitive::OnSuccessAndFailure {
                            effect,
                            on_failure,
                            on_success,
                        } => {
                            stack.push(Frame::Fold {
                                on_failure,
                                on_success,
                            });
                            step = Step::Effect(*effect);
                        }
                        Primitive::Stateful(f) => {
                            let context = FiberContext {
                                id: self.id,
                                flags,
                                env: &self.env,
                                executor: &self.executor,
                            };
                            step = match catch_unwind(AssertUnwindSafe(move || f(&context))) {
                                Ok(next) => Step::Effect(next),
                                Err(payload) => Step::Failure(Cause::halt(Defect::from_panic(
                                    payload.as_ref(),
                                ))),
                            };
                        }
                        Primitive::UpdateRuntimeFlags {
                            patch,
                            region: None,
                        } => {
                            flags = patch.apply(flags);
                            step = Step::Value(Box::new(()));
                        }
                        Primitive::UpdateRuntimeFlags {
                            patch,
                            region: Some(body),
                        } => {
                            let previous = flags;
                            flags = patch.apply(flags);
                            stack.push(Frame::RestoreFlags(previous));
                            step = match catch_unwind(AssertUnwindSafe(move || body(previous))) {
                                Ok(next) => Step::Effect(next),
                                Err(payload) => Step::Failure(Cause::halt(Defect::from_panic(
                                    payload.as_ref(),
                                ))),
                            };
                        }
                        Primitive::YieldNow => {
                            self.park_ready(Primitive::succeed_unit(), stack, flags);
                            self.executor.schedule(Arc::clone(self));
                            return;
                        }
                        Primitive::Async {
                            register,
                            blocking_on,
                        } => {
                            let epoch = {
                                let mut cell = self.cell.lock();
                                cell.stack = stack;
                                cell.flags = flags;
                                cell.epoch += 1;
                                cell.phase = Phase::Suspended { blocking_on };
                                cell.epoch
                            };
                            let resume = ResumeInner {
                                record: Arc::clone(self),
                                epoch,
                            };
                            if let Err(payload) =
                                catch_unwind(AssertUnwindSafe(move || register(resume)))
                            {
                                let defect = Defect::from_panic(payload.as_ref());
                                self.resume_with(epoch, Primitive::fail_now(Cause::halt(defect)));
                            }
                            return;
                        }
                    }
                }
                Step::Value(value) => match stack.pop() {
                    None => {
                        self.complete(Exit::Success(value));
                        return;
                    }
                    Some(Frame::OnSuccess(k)) | Some(Frame::Fold { on_success: k, .. }) => {
                        step = match catch_unwind(AssertUnwindSafe(move || k(value))) {
                            Ok(next) => Step::Effect(next),
                            Err(payload) => {
                                Step::Failure(Cause::halt(Defect::from_panic(payload.as_ref())))
                            }
                        };
                    }
                    Some(Frame::RestoreFlags(previous)) => {
                        flags = previous;
                        // A pending interrupt becomes observable the
                        // moment the region ends; the in-flight value is
                        // discarded.
                        if flags.interruptible() && self.interrupted.load(Ordering::Acquire) {
                            step = Step::Failure(self.interrupt_cause());
                        } else {
                            step = Step::Value(value);
                        }
                    }
                },
                Step::Failure(cause) => match stack.pop() {
                    None => {
                        self.complete(Exit::Failure(cause));
                        return;
                    }
                    Some(Frame::OnSuccess(_)) => {
                        step = Step::Failure(cause);
                    }
                    Some(Frame::Fold { on_failure, .. }) => {
                        step = match catch_unwind(AssertUnwindSafe(move || on_failure(cause))) {
                            Ok(next) => Step::Effect(next),
                            Err(payload) => {
                                Step::Failure(Cause::halt(Defect::from_panic(payload.as_ref())))
                            }
                        };
                    }
                    Some(Frame::RestoreFlags(previous)) => {
                        flags = previous;
                        if flags.interruptible()
                            && self.interrupted.load(Ordering::Acquire)
                            && !cause.interrupted()
                        {
                            step = Step::Failure(cause.then(self.interrupt_cause()));
                        } else {
                            step = Step::Failure(cause);
                        }
                    }
                },
            }
        }
    }

    /// Parks the fiber in the `Ready` phase with the given continuation.
    fn park_ready(&self, primitive: Primitive, stack: FrameStack, flags: RuntimeFlags) {
        let mut cell = self.cell.lock();
        cell.stack = stack;
        cell.flags = flags;
        cell.phase = Phase::Ready(primitive);
    }

    /// Builds the interrupt cause from the recorded requesters.
    fn interrupt_cause(&self) -> ErasedCause {
        let interrupters = self.cell.lock().interrupters.clone();
        let mut combined: ErasedCause = Cause::Empty;
        for id in interrupters {
            combined = combined.both(Cause::interrupt(id));
        }
        if combined.is_empty() {
            combined = Cause::interrupt(FiberId::external());
        }
        combined
    }

    /// Resumes a suspended fiber with the given continuation.
    ///
    /// A stale epoch (the suspension was already resolved by a resume or
    /// an interrupt) is a no-op; returns whether this call won.
    pub(crate) fn resume_with(self: &Arc<Self>, epoch: u64, primitive: Primitive) -> bool {
        {
            let mut cell = self.cell.lock();
            if !matches!(cell.phase, Phase::Suspended { .. }) || cell.epoch != epoch {
                return false;
            }
            cell.phase = Phase::Ready(primitive);
        }
        self.executor.schedule(Arc::clone(self));
        true
    }

    /// Records an interruption request from `by`.
    ///
    /// A suspended interruptible fiber is woken immediately with the
    /// interrupt cause, invalidating its outstanding resume. A running
    /// fiber observes the request at its next interruptible checkpoint.
    /// Interrupting a settled fiber is a no-op.
    pub(crate) fn interrupt(self: &Arc<Self>, by: FiberId) {
        let mut cell = self.cell.lock();
        if matches!(cell.phase, Phase::Done) {
            return;
        }
        if !cell.interrupters.contains(&by) {
            cell.interrupters.push(by);
        }
        self.interrupted.store(true, Ordering::Release);
        debug!(fiber = %self.id, by = %by, "interrupt requested");

        if matches!(cell.phase, Phase::Suspended { .. }) && cell.flags.interruptible() {
            cell.epoch += 1;
            let mut combined: ErasedCause = Cause::Empty;
            for id in &cell.interrupters {
                combined = combined.both(Cause::interrupt(*id));
            }
            cell.phase = Phase::Ready(Primitive::fail_now(combined));
            drop(cell);
            self.executor.schedule_interrupt(Arc::clone(self));
        }
    }

    /// Settles the fiber and notifies observers exactly once.
    fn complete(&self, exit: ErasedExit) {
        trace!(fiber = %self.id, success = exit.is_success(), "fiber done");
        let mut observers = {
            let mut cell = self.cell.lock();
            cell.phase = Phase::Done;
            std::mem::take(&mut cell.observers)
        };
        // Observers run without the cell lock held; the exit stays local
        // until every observer (including ones registered during this
        // window) has seen it.
        loop {
            for observer in observers.drain(..) {
                observer(&exit);
            }
            let mut cell = self.cell.lock();
            if cell.observers.is_empty() {
                cell.exit = Some(exit);
                drop(cell);
                self.done.notify_all();
                return;
            }
            observers = std::mem::take(&mut cell.observers);
            drop(cell);
        }
    }

    /// Registers an observer; invoked immediately if already settled.
    pub(crate) fn on_exit_erased(&self, observer: Observer) {
        let mut cell = self.cell.lock();
        if matches!(cell.phase, Phase::Done) {
            if let Some(exit) = cell.exit.take() {
                drop(cell);
                observer(&exit);
                let mut cell = self.cell.lock();
                cell.exit = Some(exit);
                drop(cell);
                self.done.notify_all();
            } else if !cell.exit_taken {
                // Completion notification in flight; the completing
                // worker drains late registrations before storing.
                cell.observers.push(observer);
            }
        } else {
            cell.observers.push(observer);
        }
    }

    /// Blocks the calling thread until the fiber settles, then takes
    /// the exit.
    pub(crate) fn join_erased(&self) -> ErasedExit {
        let mut cell = self.cell.lock();
        loop {
            if let Some(exit) = cell.exit.take() {
                cell.exit_taken = true;
                return exit;
            }
            self.done.wait(&mut cell);
        }
    }
}

impl fmt::Debug for FiberRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberRecord")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// The view of a fiber handed to `Stateful` instructions.
///
/// Obtained through accessor effects such as
/// [`Effect::fiber_id`](crate::Effect::fiber_id) and
/// [`Effect::service`](crate::Effect::service).
pub struct FiberContext<'a> {
    id: FiberId,
    flags: RuntimeFlags,
    env: &'a Env,
    executor: &'a Arc<ExecutorShared>,
}

impl FiberContext<'_> {
    /// The identifier of the fiber running this instruction.
    #[must_use]
    pub const fn fiber_id(&self) -> FiberId {
        self.id
    }

    /// The fiber's current runtime flags.
    #[must_use]
    pub const fn flags(&self) -> RuntimeFlags {
        self.flags
    }

    /// The fiber's status as seen from inside one of its instructions.
    #[must_use]
    pub const fn status(&self) -> FiberStatus {
        FiberStatus::Running
    }

    /// The fiber's service environment.
    #[must_use]
    pub const fn env(&self) -> &Env {
        self.env
    }

    /// Starts a child fiber on the same executor, inheriting this
    /// fiber's environment and flags.
    pub(crate) fn spawn_child(&self, primitive: Primitive) -> Arc<FiberRecord> {
        self.executor
            .spawn_fiber(primitive, self.env.clone(), self.flags)
    }

    /// The runtime's default scope finalization strategy.
    pub(crate) fn default_strategy(&self) -> ExecutionStrategy {
        self.executor.config().default_strategy
    }
}

impl fmt::Debug for FiberContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberContext")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// The untyped resume handle delivered to `Async` registrations.
pub(crate) struct ResumeInner {
    record: Arc<FiberRecord>,
    epoch: u64,
}

impl ResumeInner {
    /// Resumes the fiber with the given continuation; no-op when stale.
    pub(crate) fn resume(self, primitive: Primitive) -> bool {
        self.record.resume_with(self.epoch, primitive)
    }
}

/// A typed handle to a running fiber.
///
/// The handle is the single consumer of the fiber's typed exit:
/// [`join`](Fiber::join) and [`interrupt`](Fiber::interrupt) consume the
/// handle, so the success value is taken exactly once. Observation APIs
/// ([`on_exit`](Fiber::on_exit), [`await_exit`](Fiber::await_exit))
/// clone, and therefore require `A: Clone, E: Clone`.
pub struct Fiber<A, E> {
    record: Arc<FiberRecord>,
    _types: PhantomData<fn() -> (A, E)>,
}

impl<A, E> fmt::Debug for Fiber<A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.record.id())
            .field("status", &self.record.status())
            .finish_non_exhaustive()
    }
}

impl<A, E> Fiber<A, E>
where
    A: Send + 'static,
    E: Send + Sync + 'static,
{
    pub(crate) fn from_record(record: Arc<FiberRecord>) -> Self {
        Self {
            record,
            _types: PhantomData,
        }
    }

    /// The fiber's identifier.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.record.id()
    }

    /// The fiber's current status.
    #[must_use]
    pub fn status(&self) -> FiberStatus {
        self.record.status()
    }

    /// Returns true if the fiber has settled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.record.status() == FiberStatus::Done
    }

    /// Blocks the calling thread until the fiber settles and returns
    /// its exit.
    #[must_use]
    pub fn join(self) -> Exit<E, A> {
        reify_exit::<A, E>(self.record.join_erased())
    }

    /// Requests interruption and returns immediately.
    ///
    /// The request is attributed to [`FiberId::external`]. It is
    /// observed at the fiber's next interruptible checkpoint; a settled
    /// fiber ignores it.
    pub fn interrupt_request(&self) {
        self.record.interrupt(FiberId::external());
    }

    /// Requests interruption and blocks until the fiber settles.
    ///
    /// The exit reflects interruption unless the fiber completed
    /// through another path first.
    #[must_use]
    pub fn interrupt(self) -> Exit<E, A> {
        self.interrupt_request();
        self.join()
    }

    /// Registers an observer for the fiber's exit.
    ///
    /// Invoked exactly once; immediately if the fiber has already
    /// settled.
    pub fn on_exit(&self, f: impl FnOnce(&Exit<E, A>) + Send + 'static)
    where
        A: Clone,
        E: Clone,
    {
        self.record.on_exit_erased(Box::new(move |erased| {
            f(&reify_exit_ref::<A, E>(erased));
        }));
    }

    /// An effect that suspends the running fiber until this fiber
    /// settles, succeeding with its exit.
    pub fn await_exit<E2: Send + Sync + 'static>(&self) -> Effect<Exit<E, A>, E2>
    where
        A: Clone,
        E: Clone,
    {
        let record = Arc::clone(&self.record);
        Effect::async_effect_blocking_on(record.id(), move |resume| {
            record.on_exit_erased(Box::new(move |erased| {
                let _ = resume.succeed(reify_exit_ref::<A, E>(erased));
            }));
        })
    }
}

/// Restores the typed exit from the erased representation, by value.
fn reify_exit<A: 'static, E: 'static>(exit: ErasedExit) -> Exit<E, A> {
    match exit {
        Exit::Success(value) => match value.downcast::<A>() {
            Ok(a) => Exit::Success(*a),
            Err(_) => Exit::Failure(Cause::halt(Defect::new("exit value had unexpected type"))),
        },
        Exit::Failure(erased) => Exit::Failure(cause::reify::<E>(erased)),
    }
}

/// Restores the typed exit from the erased representation, by cloning.
fn reify_exit_ref<A: Clone + 'static, E: Clone + 'static>(exit: &ErasedExit) -> Exit<E, A> {
    match exit {
        Exit::Success(value) => match value.downcast_ref::<A>() {
            Some(a) => Exit::Success(a.clone()),
            None => Exit::Failure(Cause::halt(Defect::new("exit value had unexpected type"))),
        },
        Exit::Failure(erased) => Exit::Failure(cause::reify_ref::<E>(erased)),
    }
}
