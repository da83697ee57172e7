//! Defect payloads.
//!
//! A defect is an unexpected failure: a caught panic or a runtime bug.
//! Defects travel in [`Cause::Halt`](crate::types::Cause) nodes and are
//! never recovered by typed-error combinators.

use core::fmt;
use std::any::Any;

/// Payload of an unexpected failure.
///
/// This wraps the failure message for safe transport across fiber
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defect {
    message: String,
}

impl Defect {
    /// Creates a new defect with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Converts a caught panic payload into a defect.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Self { message }
    }

    /// Returns the defect message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "defect: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_panic_str() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(Defect::from_panic(payload.as_ref()).message(), "boom");
    }

    #[test]
    fn from_panic_string() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom".to_string());
        assert_eq!(Defect::from_panic(payload.as_ref()).message(), "kaboom");
    }

    #[test]
    fn from_panic_opaque() {
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(Defect::from_panic(payload.as_ref()).message(), "unknown panic");
    }
}
