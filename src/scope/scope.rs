//! The scope handle.

use crate::effect::primitive::Primitive;
use crate::effect::Effect;
use crate::scope::release_map::{ExecutionStrategy, FinalizerKey, ReleaseMap};
use crate::scope::ScopeExit;
use std::convert::Infallible;

/// A handle pairing a [`ReleaseMap`] with a lifetime.
///
/// Scopes are cheap to clone; clones share the same registry, so a
/// child fiber can register finalizers into its parent's scope. Obtain
/// one with [`Effect::scoped`](crate::Effect::scoped), which also
/// guarantees the close, or with [`Scope::new`] when managing the
/// lifetime by hand.
#[derive(Clone, Debug)]
pub struct Scope {
    release_map: ReleaseMap,
}

impl Scope {
    /// Creates a scope with a fresh, open release map.
    ///
    /// The caller owns the lifetime: [`close`](Scope::close) must be
    /// called exactly once when the scope should end.
    #[must_use]
    pub fn new() -> Self {
        Self {
            release_map: ReleaseMap::new(),
        }
    }

    /// The underlying finalizer registry.
    #[must_use]
    pub const fn release_map(&self) -> &ReleaseMap {
        &self.release_map
    }

    /// Registers a finalizer to run when this scope closes.
    pub fn add_finalizer(
        &self,
        finalizer: impl FnOnce(&ScopeExit) -> Effect<(), Infallible> + Send + 'static,
    ) -> Effect<FinalizerKey, Infallible> {
        self.release_map.add(finalizer)
    }

    /// Acquires a resource and guarantees its release when this scope
    /// closes.
    ///
    /// The acquisition and the registration of the release are one
    /// uninterruptible region: once `acquire` has produced the
    /// resource, the release is registered before any interrupt can be
    /// observed.
    pub fn acquire_release<A, E>(
        &self,
        acquire: Effect<A, E>,
        release: impl FnOnce(A) -> Effect<(), Infallible> + Send + 'static,
    ) -> Effect<A, E>
    where
        A: Clone + Send + 'static,
        E: Send + Sync + 'static,
    {
        let scope = self.clone();
        acquire
            .and_then(move |resource| {
                let for_release = resource.clone();
                scope
                    .add_finalizer(move |_exit| release(for_release))
                    .widen()
                    .map(move |_key| resource)
            })
            .uninterruptible()
    }

    /// Closes the scope with the runtime's default finalization
    /// strategy. The release runs uninterruptibly.
    pub fn close(&self, exit: ScopeExit) -> Effect<(), Infallible> {
        let map = self.release_map.clone();
        Effect::from_primitive(Primitive::Stateful(Box::new(move |ctx| {
            map.release_all(exit, ctx.default_strategy())
                .uninterruptible()
                .into_primitive()
        })))
    }

    /// Closes the scope with an explicit finalization strategy. The
    /// release runs uninterruptibly.
    pub fn close_with(&self, exit: ScopeExit, strategy: ExecutionStrategy) -> Effect<(), Infallible> {
        self.release_map.release_all(exit, strategy).uninterruptible()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}
