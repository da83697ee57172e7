//! Scopes and the finalizer registry.
//!
//! A [`Scope`] ties resource cleanup to a lifetime: effects register
//! [`Finalizer`]s against it, and when the scope closes every finalizer
//! runs exactly once, in reverse acquisition order for the sequential
//! strategy. A finalizer added after the scope has already closed runs
//! immediately against the stored exit instead of being silently kept.
//!
//! The registry itself is the [`ReleaseMap`]; [`Scope`] is the handle
//! collaborators use. [`Effect::scoped`](crate::Effect::scoped) wires a
//! fresh scope to an effect's lifetime and guarantees the close happens
//! on success, failure, and interruption alike.

pub mod release_map;
mod scope;

pub use release_map::{ExecutionStrategy, Finalizer, FinalizerKey, ReleaseMap};
pub use scope::Scope;

use crate::types::exit::Exit;

/// How a scope ended, as observed by its finalizers.
///
/// The failure side carries the [`Cause`](crate::Cause) shape of the
/// primary outcome (defects, interruption attribution, and sequencing
/// structure) with typed error values elided; ownership of those stays
/// with the scope's caller.
pub type ScopeExit = Exit<(), ()>;
