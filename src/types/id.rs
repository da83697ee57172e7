//! Identifier types for runtime entities.
//!
//! Fiber identifiers are allocated from a process-wide counter so they
//! stay unique across runtimes. The zero identifier is reserved for
//! interruption requests that originate outside any fiber (for example
//! from a thread holding a [`Fiber`](crate::runtime::Fiber) handle).

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static FIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for a fiber.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl FiberId {
    /// Allocates a fresh fiber identifier.
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(FIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The reserved identifier for interruption requests delivered from
    /// outside any fiber.
    #[must_use]
    pub const fn external() -> Self {
        Self(0)
    }

    /// Returns the raw numeric value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Creates a fiber ID for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FiberId({})", self.0)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = FiberId::next();
        let b = FiberId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn external_is_reserved() {
        assert_eq!(FiberId::external().as_u64(), 0);
        assert_ne!(FiberId::next(), FiberId::external());
    }

    #[test]
    fn display_format() {
        assert_eq!(FiberId::new_for_test(3).to_string(), "F3");
    }
}
