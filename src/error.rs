//! Typed errors for the configuration surface.
//!
//! Failures inside running effects flow through
//! [`Cause`](crate::Cause) and [`Exit`](crate::Exit); the error types
//! here cover the crate's plain fallible APIs.

use thiserror::Error;

/// An error produced while building a runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable was set to an unparseable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// The environment variable name.
        key: &'static str,
        /// The rejected raw value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}
