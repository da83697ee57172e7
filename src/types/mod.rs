//! Core value types for the Weft runtime.
//!
//! Everything in this module is an immutable value that can be freely
//! shared between fibers: identifiers, the [`Cause`] failure algebra,
//! terminal [`Exit`] outcomes, per-fiber [`RuntimeFlags`], and the
//! [`Env`] service map. The only mutable runtime state lives behind the
//! cells in [`crate::runtime`] and [`crate::scope`].

pub mod cause;
pub mod defect;
pub mod env;
pub mod exit;
pub mod flags;
pub mod id;

pub use cause::{Cause, ErrorPayload, Trace};
pub use defect::Defect;
pub use env::Env;
pub use exit::Exit;
pub use flags::{RuntimeFlags, RuntimeFlagsPatch};
pub use id::FiberId;
