//! Weft: a cancel-correct effect runtime for Rust.
//!
//! # Overview
//!
//! Weft separates *describing* a computation from *running* it. An
//! [`Effect`] is an immutable value: building one performs no work, and
//! composing effects wraps descriptions without mutating them. A
//! [`Runtime`] interprets a description on a fiber, a cooperatively
//! scheduled logical thread of execution, and produces exactly one
//! [`Exit`] recording how the fiber settled.
//!
//! # Core Guarantees
//!
//! - **Stack safety**: the interpreter runs an explicit continuation
//!   stack on the heap; arbitrarily deep `and_then` chains never touch
//!   the host call stack.
//! - **No silent failure**: typed errors, defects (panics and bugs), and
//!   interruption are all carried in the [`Cause`] algebra. Ordinary
//!   recovery combinators see typed errors only; defects and interruption
//!   must be unwrapped deliberately.
//! - **Cancel-correctness**: interruption is a cooperative protocol
//!   observed at well-defined checkpoints. A region marked
//!   uninterruptible always runs to completion once entered.
//! - **Deterministic cleanup**: finalizers registered against a
//!   [`Scope`] run in reverse acquisition order, at most once, on every
//!   scope-ending path (success, failure, or interruption), and their
//!   failures are never dropped.
//! - **Fairness**: a fiber yields its executor back to the scheduler
//!   after a configurable operation budget even if it never suspends.
//!
//! # Module Structure
//!
//! - [`types`]: core value types ([`Cause`], [`Exit`], [`FiberId`],
//!   [`RuntimeFlags`], [`Env`])
//! - [`effect`]: the effect description algebra and its combinators
//! - [`runtime`]: the fiber interpreter, scheduler, and runtime surface
//! - [`scope`]: scopes and the finalizer registry
//! - [`error`]: typed errors for the configuration surface
//!
//! # Example
//!
//! ```
//! use weft::{Effect, Runtime};
//!
//! let runtime = Runtime::new();
//! let program: Effect<i32, String> = Effect::succeed(1)
//!     .and_then(|x| Effect::succeed(x + 1))
//!     .map(|x| x * 10);
//! let exit = runtime.run(program);
//! assert_eq!(exit.into_result().ok(), Some(20));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_inception)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod effect;
pub mod error;
pub mod runtime;
pub mod scope;
pub mod tracing_compat;
pub mod types;

// Re-exports for convenient access to core types
pub use effect::{Effect, InterruptStatusRestore, Resume};
pub use error::ConfigError;
pub use runtime::{Fiber, FiberContext, FiberStatus, Runtime, RuntimeBuilder, RuntimeConfig};
pub use scope::{ExecutionStrategy, FinalizerKey, ReleaseMap, Scope, ScopeExit};
pub use types::{
    Cause, Defect, Env, ErrorPayload, Exit, FiberId, RuntimeFlags, RuntimeFlagsPatch, Trace,
};
