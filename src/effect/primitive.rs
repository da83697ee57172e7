//! The closed instruction set interpreted by the fiber runtime.
//!
//! A [`Primitive`] is the type-erased form of an
//! [`Effect`](crate::Effect): success values travel as boxed `Any`
//! values and typed errors as [`ErrorPayload`]s, so one continuation
//! stack can thread heterogeneously-typed programs. The phantom types on
//! the public surface guarantee every downcast at the typed boundary.

use crate::runtime::fiber::ResumeInner;
use crate::runtime::FiberContext;
use crate::types::cause::{Cause, ErasedCause};
use crate::types::defect::Defect;
use crate::types::exit::Exit;
use crate::types::flags::{RuntimeFlags, RuntimeFlagsPatch};
use crate::types::id::FiberId;
use crate::types::ErrorPayload;
use core::fmt;
use std::any::Any;

/// A type-erased success value.
pub(crate) type BoxedValue = Box<dyn Any + Send>;

/// The exit representation stored on a completed fiber.
pub(crate) type ErasedExit = Exit<ErrorPayload, BoxedValue>;

/// A continuation awaiting a success value.
pub(crate) type SuccessCont = Box<dyn FnOnce(BoxedValue) -> Primitive + Send>;

/// A continuation awaiting a failure cause.
pub(crate) type FailureCont = Box<dyn FnOnce(ErasedCause) -> Primitive + Send>;

/// One instruction of a suspended computation.
///
/// Descriptions are immutable: combinators wrap an existing primitive,
/// they never modify one. Execution consumes the description.
pub(crate) enum Primitive {
    /// An already-computed success value.
    SucceedNow(BoxedValue),
    /// A success value computed by running a side effect. A panic in the
    /// thunk is caught by the interpreter and converted to a defect.
    Sync(Box<dyn FnOnce() -> BoxedValue + Send>),
    /// A lazily-built failure cause.
    Fail(Box<dyn FnOnce() -> ErasedCause + Send>),
    /// Suspends the fiber until the registered callback resumes it.
    Async {
        /// Invoked exactly once with the resume handle.
        register: Box<dyn FnOnce(ResumeInner) + Send>,
        /// The fiber this suspension is waiting on, if known.
        blocking_on: Option<FiberId>,
    },
    /// Sequential composition: run `effect`, feed its success value to
    /// `on_success`.
    OnSuccess {
        effect: Box<Primitive>,
        on_success: SuccessCont,
    },
    /// Full fold over both channels.
    OnSuccessAndFailure {
        effect: Box<Primitive>,
        on_failure: FailureCont,
        on_success: SuccessCont,
    },
    /// Gives the description access to the owning fiber.
    Stateful(Box<dyn FnOnce(&FiberContext<'_>) -> Primitive + Send>),
    /// Patches the fiber's runtime flags. With a `region`, the previous
    /// flags are restored when the region exits; without one, the patch
    /// applies to the remainder of the fiber.
    UpdateRuntimeFlags {
        patch: RuntimeFlagsPatch,
        region: Option<Box<dyn FnOnce(RuntimeFlags) -> Primitive + Send>>,
    },
    /// A voluntary fairness checkpoint.
    YieldNow,
}

impl Primitive {
    /// An already-computed unit value.
    pub(crate) fn succeed_unit() -> Self {
        Self::SucceedNow(Box::new(()))
    }

    /// A failure carrying an already-built cause.
    pub(crate) fn fail_now(cause: ErasedCause) -> Self {
        Self::Fail(Box::new(move || cause))
    }

    /// The instruction tag, for diagnostics.
    pub(crate) const fn tag(&self) -> &'static str {
        match self {
            Self::SucceedNow(_) => "SucceedNow",
            Self::Sync(_) => "Sync",
            Self::Fail(_) => "Fail",
            Self::Async { .. } => "Async",
            Self::OnSuccess { .. } => "OnSuccess",
            Self::OnSuccessAndFailure { .. } => "OnSuccessAndFailure",
            Self::Stateful(_) => "Stateful",
            Self::UpdateRuntimeFlags { .. } => "UpdateRuntimeFlags",
            Self::YieldNow => "YieldNow",
        }
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Downcasts an erased success value and feeds it to a typed
/// continuation.
///
/// A mismatch becomes a defect; it cannot happen when the value flowed
/// through the phantom-typed `Effect` surface.
pub(crate) fn with_typed<A: 'static>(
    value: BoxedValue,
    f: impl FnOnce(A) -> Primitive,
) -> Primitive {
    match value.downcast::<A>() {
        Ok(a) => f(*a),
        Err(_) => Primitive::fail_now(Cause::halt(Defect::new(
            "success value had unexpected type",
        ))),
    }
}
