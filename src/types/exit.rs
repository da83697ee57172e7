//! Terminal fiber outcomes.
//!
//! An [`Exit`] is produced exactly once per fiber: either the success
//! value or the [`Cause`] the fiber failed with. It is immutable and can
//! be stored, inspected, or converted back into an effect with
//! [`Effect::from_exit`](crate::Effect::from_exit).

use crate::types::cause::Cause;
use core::fmt;

/// The terminal outcome of a fiber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit<E, A> {
    /// The fiber completed with a value.
    Success(A),
    /// The fiber failed with a cause: a typed error, a defect,
    /// interruption, or a composition of them.
    Failure(Cause<E>),
}

impl<E, A> Exit<E, A> {
    /// A successful exit.
    #[must_use]
    pub const fn succeed(value: A) -> Self {
        Self::Success(value)
    }

    /// A failed exit with the given cause.
    #[must_use]
    pub const fn failed(cause: Cause<E>) -> Self {
        Self::Failure(cause)
    }

    /// Returns true if this exit is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true if this exit is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns true if this exit is a failure containing interruption.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Success(_) => false,
            Self::Failure(cause) => cause.interrupted(),
        }
    }

    /// Borrows the success value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&A> {
        match self {
            Self::Success(a) => Some(a),
            Self::Failure(_) => None,
        }
    }

    /// Borrows the failure cause, if any.
    #[must_use]
    pub const fn cause(&self) -> Option<&Cause<E>> {
        match self {
            Self::Success(_) => None,
            Self::Failure(cause) => Some(cause),
        }
    }

    /// Maps the success value.
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Exit<E, B> {
        match self {
            Self::Success(a) => Exit::Success(f(a)),
            Self::Failure(cause) => Exit::Failure(cause),
        }
    }

    /// Maps the typed-error channel of the cause, leaving defects and
    /// interruption untouched.
    pub fn map_err<E2>(self, f: impl FnMut(E) -> E2) -> Exit<E2, A> {
        match self {
            Self::Success(a) => Exit::Success(a),
            Self::Failure(cause) => Exit::Failure(cause.map(f)),
        }
    }

    /// Folds both sides into a single value.
    pub fn fold<B>(self, on_failure: impl FnOnce(Cause<E>) -> B, on_success: impl FnOnce(A) -> B) -> B {
        match self {
            Self::Success(a) => on_success(a),
            Self::Failure(cause) => on_failure(cause),
        }
    }

    /// Converts into a `Result`, keeping the full cause on the error
    /// side.
    pub fn into_result(self) -> Result<A, Cause<E>> {
        match self {
            Self::Success(a) => Ok(a),
            Self::Failure(cause) => Err(cause),
        }
    }

    /// Returns the success value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the exit is a failure.
    #[track_caller]
    pub fn unwrap(self) -> A
    where
        E: fmt::Debug,
    {
        match self {
            Self::Success(a) => a,
            Self::Failure(cause) => {
                panic!("called `Exit::unwrap()` on a `Failure` value: {cause:?}")
            }
        }
    }
}

impl<E, A> From<Result<A, E>> for Exit<E, A> {
    #[track_caller]
    fn from(result: Result<A, E>) -> Self {
        match result {
            Ok(a) => Self::Success(a),
            Err(e) => Self::Failure(Cause::fail(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::defect::Defect;
    use crate::types::id::FiberId;

    #[test]
    fn map_touches_success_only() {
        let ok: Exit<&str, i32> = Exit::succeed(1);
        assert_eq!(ok.map(|x| x + 1), Exit::succeed(2));

        let bad: Exit<&str, i32> = Exit::failed(Cause::fail("e"));
        assert!(bad.map(|x| x + 1).is_failure());
    }

    #[test]
    fn interruption_is_visible() {
        let exit: Exit<&str, ()> =
            Exit::failed(Cause::halt(Defect::new("bug")).both(Cause::interrupt(FiberId::new_for_test(1))));
        assert!(exit.is_interrupted());
    }

    #[test]
    fn result_round_trip() {
        let exit: Exit<&str, i32> = Ok::<_, &str>(5).into();
        assert_eq!(exit.into_result().ok(), Some(5));
    }
}
