//! The `Cause` failure algebra.
//!
//! A [`Cause`] describes zero, one, or many co-occurring failures while
//! preserving the distinction between an expected typed error, a defect,
//! and interruption:
//!
//! - `Fail(E)`: an expected, recoverable domain error
//! - `Halt(Defect)`: a programming error or caught panic
//! - `Interrupt(FiberId)`: cooperative cancellation, attributed to the
//!   requesting fiber
//!
//! Causes compose with [`then`](Cause::then) (sequential: the first
//! failure happened before the second, as in try/finally ordering) and
//! [`both`](Cause::both) (concurrent, unordered). Both combinators are
//! associative with [`Cause::Empty`] as identity.
//!
//! Mapping combinators touch the typed channel only: `Halt` and
//! `Interrupt` nodes pass through [`map`](Cause::map) and
//! [`flat_map`](Cause::flat_map) structurally untouched, so cancellation
//! and defects can never be laundered into recoverable errors.

use crate::types::defect::Defect;
use crate::types::id::FiberId;
use core::fmt;
use std::any::Any;
use std::panic::Location;

/// A lightweight origin marker attached to each failure node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Trace {
    location: Option<&'static Location<'static>>,
}

impl Trace {
    /// A trace with no origin information.
    #[must_use]
    pub const fn empty() -> Self {
        Self { location: None }
    }

    /// Captures the caller's source location.
    #[track_caller]
    #[must_use]
    pub fn capture() -> Self {
        Self {
            location: Some(Location::caller()),
        }
    }

    /// Returns the recorded source location, if any.
    #[must_use]
    pub const fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "at {}:{}:{}", loc.file(), loc.line(), loc.column()),
            None => write!(f, "<no trace>"),
        }
    }
}

/// A type-erased typed-error payload.
///
/// The interpreter moves error values through the continuation stack
/// without knowing their concrete type; the phantom types on
/// [`Effect`](crate::Effect) guarantee the payload is downcast back to
/// the type it was erased from at the typed boundary.
pub struct ErrorPayload {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ErrorPayload {
    /// Erases a typed error value.
    pub(crate) fn new<E: Send + Sync + 'static>(error: E) -> Self {
        Self {
            value: Box::new(error),
            type_name: std::any::type_name::<E>(),
        }
    }

    /// Returns the type name the payload was erased from.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the payload as a concrete type, if it has that type.
    #[must_use]
    pub fn downcast_ref<E: 'static>(&self) -> Option<&E> {
        self.value.downcast_ref::<E>()
    }

    /// Recovers the owned payload as a concrete type.
    pub(crate) fn downcast<E: 'static>(self) -> Result<E, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<E>() {
            Ok(e) => Ok(*e),
            Err(value) => Err(Self { value, type_name }),
        }
    }
}

impl fmt::Debug for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorPayload({})", self.type_name)
    }
}

/// The algebraic failure value.
///
/// See the [module documentation](self) for the composition laws.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause<E> {
    /// No failure. Identity for [`then`](Cause::then) and
    /// [`both`](Cause::both).
    Empty,
    /// An expected, typed domain error.
    Fail(E, Trace),
    /// A defect: a caught panic or runtime bug.
    Halt(Defect, Trace),
    /// Interruption, attributed to the requesting fiber.
    Interrupt(FiberId, Trace),
    /// Two causes where the left failure happened before the right one.
    Then(Box<Cause<E>>, Box<Cause<E>>),
    /// Two causes that occurred concurrently, with no ordering.
    Both(Box<Cause<E>>, Box<Cause<E>>),
}

impl<E> Cause<E> {
    /// A typed failure, with the caller's location recorded.
    #[track_caller]
    #[must_use]
    pub fn fail(error: E) -> Self {
        Self::Fail(error, Trace::capture())
    }

    /// A defect, with the caller's location recorded.
    #[track_caller]
    #[must_use]
    pub fn halt(defect: Defect) -> Self {
        Self::Halt(defect, Trace::capture())
    }

    /// An interruption attributed to `by`.
    #[track_caller]
    #[must_use]
    pub fn interrupt(by: FiberId) -> Self {
        Self::Interrupt(by, Trace::capture())
    }

    /// Sequences `self` before `other`.
    ///
    /// `Empty` is eliminated on either side, so the result never contains
    /// redundant identity nodes.
    #[must_use]
    pub fn then(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, b) => b,
            (a, Self::Empty) => a,
            (a, b) => Self::Then(Box::new(a), Box::new(b)),
        }
    }

    /// Marks `self` and `other` as concurrent, unordered failures.
    ///
    /// `Empty` is eliminated on either side.
    #[must_use]
    pub fn both(self, other: Self) -> Self {
        match (self, other) {
            (Self::Empty, b) => b,
            (a, Self::Empty) => a,
            (a, b) => Self::Both(Box::new(a), Box::new(b)),
        }
    }

    /// Returns true if this cause contains no failure at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Fail(..) | Self::Halt(..) | Self::Interrupt(..) => false,
            Self::Then(a, b) | Self::Both(a, b) => a.is_empty() && b.is_empty(),
        }
    }

    /// Returns true if this cause contains at least one `Interrupt` node.
    #[must_use]
    pub fn interrupted(&self) -> bool {
        match self {
            Self::Interrupt(..) => true,
            Self::Empty | Self::Fail(..) | Self::Halt(..) => false,
            Self::Then(a, b) | Self::Both(a, b) => a.interrupted() || b.interrupted(),
        }
    }

    /// Returns true if this cause contains at least one typed failure.
    #[must_use]
    pub fn failed(&self) -> bool {
        match self {
            Self::Fail(..) => true,
            Self::Empty | Self::Halt(..) | Self::Interrupt(..) => false,
            Self::Then(a, b) | Self::Both(a, b) => a.failed() || b.failed(),
        }
    }

    /// Returns true if this cause contains at least one defect.
    #[must_use]
    pub fn died(&self) -> bool {
        match self {
            Self::Halt(..) => true,
            Self::Empty | Self::Fail(..) | Self::Interrupt(..) => false,
            Self::Then(a, b) | Self::Both(a, b) => a.died() || b.died(),
        }
    }

    /// Collects all typed failures, depth-first, left to right.
    #[must_use]
    pub fn failures(&self) -> Vec<&E> {
        let mut out = Vec::new();
        self.collect_failures(&mut out);
        out
    }

    fn collect_failures<'a>(&'a self, out: &mut Vec<&'a E>) {
        match self {
            Self::Fail(e, _) => out.push(e),
            Self::Empty | Self::Halt(..) | Self::Interrupt(..) => {}
            Self::Then(a, b) | Self::Both(a, b) => {
                a.collect_failures(out);
                b.collect_failures(out);
            }
        }
    }

    /// Collects all defects, depth-first, left to right.
    #[must_use]
    pub fn defects(&self) -> Vec<&Defect> {
        let mut out = Vec::new();
        self.collect_defects(&mut out);
        out
    }

    fn collect_defects<'a>(&'a self, out: &mut Vec<&'a Defect>) {
        match self {
            Self::Halt(d, _) => out.push(d),
            Self::Empty | Self::Fail(..) | Self::Interrupt(..) => {}
            Self::Then(a, b) | Self::Both(a, b) => {
                a.collect_defects(out);
                b.collect_defects(out);
            }
        }
    }

    /// Collects the fibers that requested interruption, depth-first.
    #[must_use]
    pub fn interruptors(&self) -> Vec<FiberId> {
        let mut out = Vec::new();
        self.collect_interruptors(&mut out);
        out
    }

    fn collect_interruptors(&self, out: &mut Vec<FiberId>) {
        match self {
            Self::Interrupt(id, _) => out.push(*id),
            Self::Empty | Self::Fail(..) | Self::Halt(..) => {}
            Self::Then(a, b) | Self::Both(a, b) => {
                a.collect_interruptors(out);
                b.collect_interruptors(out);
            }
        }
    }

    /// Extracts the first typed failure, depth-first, or returns the
    /// cause unchanged when it contains none.
    ///
    /// This is the partial match backing
    /// [`catch_all`](crate::Effect::catch_all): a cause made only of
    /// defects and interruption passes through `Err` structurally
    /// untouched and is re-raised rather than recovered.
    pub fn failure_or_cause(self) -> Result<E, Self> {
        match self {
            Self::Fail(e, _) => Ok(e),
            Self::Then(a, b) => match a.failure_or_cause() {
                Ok(e) => Ok(e),
                Err(a) => match b.failure_or_cause() {
                    Ok(e) => Ok(e),
                    Err(b) => Err(Self::Then(Box::new(a), Box::new(b))),
                },
            },
            Self::Both(a, b) => match a.failure_or_cause() {
                Ok(e) => Ok(e),
                Err(a) => match b.failure_or_cause() {
                    Ok(e) => Ok(e),
                    Err(b) => Err(Self::Both(Box::new(a), Box::new(b))),
                },
            },
            other => Err(other),
        }
    }

    /// Reduces this cause to a single defect, mapping the first typed
    /// failure through `f`.
    ///
    /// Resolution order: first typed failure, then first defect, then
    /// interruption, then an empty-cause marker. Intended for unsafe
    /// boundaries (logging, process exit), not for recovery logic.
    pub fn squash_with(self, f: impl FnOnce(E) -> Defect) -> Defect {
        match self.failure_or_cause() {
            Ok(e) => f(e),
            Err(cause) => {
                if let Some(defect) = cause.defects().first() {
                    (*defect).clone()
                } else if let Some(id) = cause.interruptors().first() {
                    Defect::new(format!("interrupted by {id}"))
                } else {
                    Defect::new("empty cause")
                }
            }
        }
    }

    /// Maps the typed-error channel, leaving `Halt` and `Interrupt`
    /// nodes structurally untouched.
    #[must_use]
    pub fn map<E2>(self, mut f: impl FnMut(E) -> E2) -> Cause<E2> {
        self.map_inner(&mut f)
    }

    fn map_inner<E2, F: FnMut(E) -> E2>(self, f: &mut F) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e, trace) => Cause::Fail(f(e), trace),
            Self::Halt(d, trace) => Cause::Halt(d, trace),
            Self::Interrupt(id, trace) => Cause::Interrupt(id, trace),
            Self::Then(a, b) => Cause::Then(
                Box::new(a.map_inner(f)),
                Box::new(b.map_inner(f)),
            ),
            Self::Both(a, b) => Cause::Both(
                Box::new(a.map_inner(f)),
                Box::new(b.map_inner(f)),
            ),
        }
    }

    /// Substitutes each typed failure with the cause produced by `f`,
    /// leaving `Halt` and `Interrupt` nodes structurally untouched.
    #[must_use]
    pub fn flat_map<E2>(self, mut f: impl FnMut(E) -> Cause<E2>) -> Cause<E2> {
        self.flat_map_inner(&mut f)
    }

    fn flat_map_inner<E2, F: FnMut(E) -> Cause<E2>>(self, f: &mut F) -> Cause<E2> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(e, _) => f(e),
            Self::Halt(d, trace) => Cause::Halt(d, trace),
            Self::Interrupt(id, trace) => Cause::Interrupt(id, trace),
            Self::Then(a, b) => {
                Cause::then(a.flat_map_inner(f), b.flat_map_inner(f))
            }
            Self::Both(a, b) => {
                Cause::both(a.flat_map_inner(f), b.flat_map_inner(f))
            }
        }
    }

    /// Clones the shape of this cause, dropping typed-error values.
    ///
    /// Defects, interruption attribution, traces, and the `Then`/`Both`
    /// structure are preserved. Used for scope exits, where finalizers
    /// observe how a scope ended without taking ownership of its error
    /// values.
    #[must_use]
    pub fn structure(&self) -> Cause<()> {
        match self {
            Self::Empty => Cause::Empty,
            Self::Fail(_, trace) => Cause::Fail((), *trace),
            Self::Halt(d, trace) => Cause::Halt(d.clone(), *trace),
            Self::Interrupt(id, trace) => Cause::Interrupt(*id, *trace),
            Self::Then(a, b) => Cause::Then(Box::new(a.structure()), Box::new(b.structure())),
            Self::Both(a, b) => Cause::Both(Box::new(a.structure()), Box::new(b.structure())),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Cause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "<empty>"),
            Self::Fail(e, _) => write!(f, "fail: {e}"),
            Self::Halt(d, _) => write!(f, "{d}"),
            Self::Interrupt(id, _) => write!(f, "interrupted by {id}"),
            Self::Then(a, b) => write!(f, "({a}) then ({b})"),
            Self::Both(a, b) => write!(f, "({a}) both ({b})"),
        }
    }
}

/// The cause representation used inside the interpreter.
pub(crate) type ErasedCause = Cause<ErrorPayload>;

/// Erases the typed channel of a cause.
pub(crate) fn erase<E: Send + Sync + 'static>(cause: Cause<E>) -> ErasedCause {
    cause.map(ErrorPayload::new)
}

/// Restores the typed channel of an erased cause.
///
/// A payload that fails to downcast becomes a defect; this cannot happen
/// when the error flowed through the phantom-typed `Effect` surface.
pub(crate) fn reify<E: 'static>(cause: ErasedCause) -> Cause<E> {
    match cause {
        Cause::Empty => Cause::Empty,
        Cause::Fail(payload, trace) => match payload.downcast::<E>() {
            Ok(e) => Cause::Fail(e, trace),
            Err(payload) => Cause::Halt(
                Defect::new(format!(
                    "error payload had unexpected type {}",
                    payload.type_name()
                )),
                trace,
            ),
        },
        Cause::Halt(d, trace) => Cause::Halt(d, trace),
        Cause::Interrupt(id, trace) => Cause::Interrupt(id, trace),
        Cause::Then(a, b) => Cause::Then(Box::new(reify(*a)), Box::new(reify(*b))),
        Cause::Both(a, b) => Cause::Both(Box::new(reify(*a)), Box::new(reify(*b))),
    }
}

/// Restores the typed channel of a borrowed erased cause by cloning.
pub(crate) fn reify_ref<E: Clone + 'static>(cause: &ErasedCause) -> Cause<E> {
    match cause {
        Cause::Empty => Cause::Empty,
        Cause::Fail(payload, trace) => match payload.downcast_ref::<E>() {
            Some(e) => Cause::Fail(e.clone(), *trace),
            None => Cause::Halt(
                Defect::new(format!(
                    "error payload had unexpected type {}",
                    payload.type_name()
                )),
                *trace,
            ),
        },
        Cause::Halt(d, trace) => Cause::Halt(d.clone(), *trace),
        Cause::Interrupt(id, trace) => Cause::Interrupt(*id, *trace),
        Cause::Then(a, b) => Cause::Then(Box::new(reify_ref(a)), Box::new(reify_ref(b))),
        Cause::Both(a, b) => Cause::Both(Box::new(reify_ref(a)), Box::new(reify_ref(b))),
    }
}

/// Maps the typed channel of an erased cause through a typed function.
pub(crate) fn map_typed<E, E2, F>(cause: ErasedCause, f: &mut F) -> ErasedCause
where
    E: 'static,
    E2: Send + Sync + 'static,
    F: FnMut(E) -> E2,
{
    match cause {
        Cause::Empty => Cause::Empty,
        Cause::Fail(payload, trace) => match payload.downcast::<E>() {
            Ok(e) => Cause::Fail(ErrorPayload::new(f(e)), trace),
            Err(payload) => Cause::Halt(
                Defect::new(format!(
                    "error payload had unexpected type {}",
                    payload.type_name()
                )),
                trace,
            ),
        },
        Cause::Halt(d, trace) => Cause::Halt(d, trace),
        Cause::Interrupt(id, trace) => Cause::Interrupt(id, trace),
        Cause::Then(a, b) => Cause::Then(
            Box::new(map_typed::<E, E2, F>(*a, f)),
            Box::new(map_typed::<E, E2, F>(*b, f)),
        ),
        Cause::Both(a, b) => Cause::Both(
            Box::new(map_typed::<E, E2, F>(*a, f)),
            Box::new(map_typed::<E, E2, F>(*b, f)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiber(n: u64) -> FiberId {
        FiberId::new_for_test(n)
    }

    #[test]
    fn then_empty_identity() {
        let c: Cause<&str> = Cause::fail("boom");
        assert_eq!(Cause::Empty.then(c.clone()), c);
        assert_eq!(c.clone().then(Cause::Empty), c);
    }

    #[test]
    fn both_empty_identity() {
        let c: Cause<&str> = Cause::halt(Defect::new("bug"));
        assert_eq!(Cause::Empty.both(c.clone()), c);
        assert_eq!(c.clone().both(Cause::Empty), c);
    }

    #[test]
    fn interrupted_finds_nested_interrupt() {
        let c: Cause<&str> = Cause::fail("boom")
            .then(Cause::halt(Defect::new("bug")).both(Cause::interrupt(fiber(7))));
        assert!(c.interrupted());
        assert_eq!(c.interruptors(), vec![fiber(7)]);
    }

    #[test]
    fn failure_or_cause_extracts_first_failure() {
        let c: Cause<&str> = Cause::fail("first").then(Cause::fail("second"));
        assert_eq!(c.failure_or_cause(), Ok("first"));
    }

    #[test]
    fn failure_or_cause_preserves_defect_only_cause() {
        let c: Cause<&str> = Cause::halt(Defect::new("bug")).then(Cause::interrupt(fiber(1)));
        let back = c.clone().failure_or_cause();
        assert_eq!(back, Err(c));
    }

    #[test]
    fn map_leaves_halt_and_interrupt_untouched() {
        let c: Cause<&str> = Cause::fail("e")
            .then(Cause::halt(Defect::new("bug")))
            .both(Cause::interrupt(fiber(2)));
        let mapped = c.map(str::len);
        assert_eq!(mapped.failures(), vec![&1]);
        assert_eq!(mapped.defects().len(), 1);
        assert_eq!(mapped.interruptors(), vec![fiber(2)]);
    }

    #[test]
    fn squash_with_prefers_typed_failure() {
        let c: Cause<&str> = Cause::halt(Defect::new("bug")).then(Cause::fail("typed"));
        let d = c.squash_with(|e| Defect::new(format!("typed: {e}")));
        assert_eq!(d.message(), "typed: typed");
    }

    #[test]
    fn squash_with_falls_back_to_defect() {
        let c: Cause<&str> = Cause::interrupt(fiber(3)).both(Cause::halt(Defect::new("bug")));
        assert_eq!(c.squash_with(|_| Defect::new("unused")).message(), "bug");
    }

    #[test]
    fn erase_reify_round_trip() {
        let c: Cause<String> = Cause::fail("boom".to_string()).then(Cause::interrupt(fiber(4)));
        let back: Cause<String> = reify(erase(c.clone()));
        assert_eq!(back, c);
    }

    #[test]
    fn reify_mismatch_becomes_defect() {
        let erased = erase(Cause::<String>::fail("boom".to_string()));
        let back: Cause<u32> = reify(erased);
        assert!(back.died());
        assert!(!back.failed());
    }

    #[test]
    fn structure_keeps_shape_and_defects() {
        let c: Cause<String> = Cause::fail("e".to_string())
            .then(Cause::halt(Defect::new("bug")).both(Cause::interrupt(fiber(5))));
        let s = c.structure();
        assert!(s.failed());
        assert!(s.interrupted());
        assert_eq!(s.defects().len(), 1);
    }
}
