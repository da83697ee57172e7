//! The ordered finalizer registry backing a scope.
//!
//! A [`ReleaseMap`] is a state cell that is either `Running` (accepting
//! finalizers under monotonically increasing keys) or `Exited` (holding
//! the exit the scope closed with). Multiple fibers may share one map,
//! so every operation is a read-compute-replace under the cell's lock,
//! never an unguarded read-modify-write.
//!
//! Guarantees:
//!
//! - each finalizer runs at most once;
//! - [`release_all`](ReleaseMap::release_all) with the sequential
//!   strategy runs finalizers in strict reverse-of-insertion order;
//! - a finalizer added after the map has exited runs immediately with
//!   the stored exit;
//! - finalizer failures are aggregated with [`Cause::both`] and
//!   surfaced, never dropped.

use crate::effect::Effect;
use crate::runtime::Fiber;
use crate::scope::ScopeExit;
use crate::tracing_compat::warn;
use crate::types::cause::Cause;
use crate::types::exit::Exit;
use core::fmt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

/// A cleanup action registered against a scope.
///
/// Invoked with the exit the scope closed with. Finalizers have no typed
/// error channel; their failures are defects or interruption, which the
/// closing machinery aggregates into the prevailing cause.
pub type Finalizer = Box<dyn FnOnce(&ScopeExit) -> Effect<(), Infallible> + Send>;

type Transform = Arc<dyn Fn(Finalizer) -> Finalizer + Send + Sync>;

/// The key a finalizer was registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FinalizerKey(u64);

impl FinalizerKey {
    const SPENT: u64 = 0;

    pub(crate) const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The key returned when a finalizer was run immediately because
    /// the map had already exited. Releasing it later is a no-op.
    pub(crate) const fn spent() -> Self {
        Self(Self::SPENT)
    }

    /// Returns true if this key no longer refers to a stored finalizer.
    #[must_use]
    pub const fn is_spent(self) -> bool {
        self.0 == Self::SPENT
    }

    const fn value(self) -> u64 {
        self.0
    }
}

/// How [`ReleaseMap::release_all`] runs the remaining finalizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Run finalizers on the closing fiber, in strict
    /// reverse-of-insertion order.
    #[default]
    Sequential,
    /// Fork one fiber per finalizer and wait for all of them.
    Concurrent,
}

enum State {
    Running {
        next_key: u64,
        finalizers: BTreeMap<u64, Finalizer>,
        transform: Option<Transform>,
    },
    Exited {
        next_key: u64,
        exit: ScopeExit,
        transform: Option<Transform>,
    },
}

/// The ordered, at-most-once finalizer registry.
pub struct ReleaseMap {
    state: Arc<Mutex<State>>,
}

impl Clone for ReleaseMap {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for ReleaseMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReleaseMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.state.lock();
        match &*guard {
            State::Running { finalizers, .. } => f
                .debug_struct("ReleaseMap")
                .field("state", &"Running")
                .field("finalizers", &finalizers.len())
                .finish(),
            State::Exited { .. } => f
                .debug_struct("ReleaseMap")
                .field("state", &"Exited")
                .finish(),
        }
    }
}

impl ReleaseMap {
    /// Creates an open release map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Running {
                next_key: 1,
                finalizers: BTreeMap::new(),
                transform: None,
            })),
        }
    }

    /// Registers a finalizer.
    ///
    /// While the map is running, the finalizer is stored under a fresh
    /// key and that key is returned. If the map has already exited, the
    /// finalizer runs immediately with the stored exit and the returned
    /// key is spent.
    pub fn add(
        &self,
        finalizer: impl FnOnce(&ScopeExit) -> Effect<(), Infallible> + Send + 'static,
    ) -> Effect<FinalizerKey, Infallible> {
        let state = Arc::clone(&self.state);
        Effect::suspend(move || {
            let finalizer: Finalizer = Box::new(finalizer);
            let mut guard = state.lock();
            match &mut *guard {
                State::Running {
                    next_key,
                    finalizers,
                    ..
                } => {
                    let key = *next_key;
                    *next_key += 1;
                    finalizers.insert(key, finalizer);
                    Effect::succeed(FinalizerKey::new(key))
                }
                State::Exited {
                    exit, transform, ..
                } => {
                    let finalizer = match transform {
                        Some(t) => t(finalizer),
                        None => finalizer,
                    };
                    let exit = exit.clone();
                    drop(guard);
                    finalizer(&exit).map(|()| FinalizerKey::spent())
                }
            }
        })
    }

    /// Removes and runs the finalizer stored under `key` with the given
    /// exit. An absent key (already released, never added, or spent) is
    /// a no-op.
    pub fn release(&self, key: FinalizerKey, exit: ScopeExit) -> Effect<(), Infallible> {
        let state = Arc::clone(&self.state);
        Effect::suspend(move || {
            let mut guard = state.lock();
            match &mut *guard {
                State::Running {
                    finalizers,
                    transform,
                    ..
                } => match finalizers.remove(&key.value()) {
                    Some(finalizer) => {
                        let finalizer = match transform {
                            Some(t) => t(finalizer),
                            None => finalizer,
                        };
                        drop(guard);
                        finalizer(&exit)
                    }
                    None => Effect::unit(),
                },
                State::Exited { .. } => Effect::unit(),
            }
        })
    }

    /// Transitions the map to `Exited` and runs every remaining
    /// finalizer with the given exit.
    ///
    /// Finalizer failures are aggregated with [`Cause::both`] and the
    /// combined cause is raised after all finalizers have run; a single
    /// failing finalizer never prevents the others from running. A
    /// second call is a no-op.
    pub fn release_all(
        &self,
        exit: ScopeExit,
        strategy: ExecutionStrategy,
    ) -> Effect<(), Infallible> {
        let state = Arc::clone(&self.state);
        Effect::suspend(move || {
            let mut guard = state.lock();
            let replaced = std::mem::replace(
                &mut *guard,
                State::Exited {
                    next_key: 0,
                    exit: exit.clone(),
                    transform: None,
                },
            );
            match replaced {
                State::Running {
                    next_key,
                    finalizers,
                    transform,
                } => {
                    *guard = State::Exited {
                        next_key,
                        exit: exit.clone(),
                        transform: transform.clone(),
                    };
                    drop(guard);
                    let finalizers: Vec<Finalizer> = match &transform {
                        Some(t) => finalizers.into_values().map(|fin| t(fin)).collect(),
                        None => finalizers.into_values().collect(),
                    };
                    match strategy {
                        ExecutionStrategy::Sequential => {
                            drain_sequential(finalizers, exit, Cause::Empty)
                        }
                        ExecutionStrategy::Concurrent => fork_all(finalizers, exit, Vec::new()),
                    }
                }
                exited @ State::Exited { .. } => {
                    *guard = exited;
                    Effect::unit()
                }
            }
        })
    }

    /// Applies `f` to every stored finalizer and to finalizers added
    /// later, composing after any previously registered transform.
    pub fn update_finalizers(
        &self,
        f: impl Fn(Finalizer) -> Finalizer + Send + Sync + 'static,
    ) -> Effect<(), Infallible> {
        let state = Arc::clone(&self.state);
        Effect::sync(move || {
            let mut guard = state.lock();
            let slot = match &mut *guard {
                State::Running { transform, .. } | State::Exited { transform, .. } => transform,
            };
            let f: Transform = Arc::new(f);
            *slot = Some(match slot.take() {
                Some(existing) => {
                    Arc::new(move |fin: Finalizer| f(existing(fin))) as Transform
                }
                None => f,
            });
        })
    }
}

/// Runs finalizers newest-first on the closing fiber, accumulating
/// failures.
fn drain_sequential(
    mut finalizers: Vec<Finalizer>,
    exit: ScopeExit,
    failures: Cause<Infallible>,
) -> Effect<(), Infallible> {
    match finalizers.pop() {
        None => {
            if failures.is_empty() {
                Effect::unit()
            } else {
                Effect::fail_cause(failures)
            }
        }
        Some(finalizer) => finalizer(&exit).exit().and_then(move |fin_exit| {
            let failures = match fin_exit {
                Exit::Success(()) => failures,
                Exit::Failure(cause) => {
                    warn!(?cause, "finalizer failed");
                    failures.both(cause)
                }
            };
            drain_sequential(finalizers, exit, failures)
        }),
    }
}

/// Forks one fiber per finalizer (newest first), then joins them all.
fn fork_all(
    mut finalizers: Vec<Finalizer>,
    exit: ScopeExit,
    mut fibers: Vec<Fiber<(), Infallible>>,
) -> Effect<(), Infallible> {
    match finalizers.pop() {
        Some(finalizer) => finalizer(&exit).fork().and_then(move |fiber| {
            fibers.push(fiber);
            fork_all(finalizers, exit, fibers)
        }),
        None => join_all(fibers, Cause::Empty),
    }
}

fn join_all(
    mut fibers: Vec<Fiber<(), Infallible>>,
    failures: Cause<Infallible>,
) -> Effect<(), Infallible> {
    match fibers.pop() {
        Some(fiber) => fiber.await_exit().and_then(move |fin_exit| {
            let failures = match fin_exit {
                Exit::Success(()) => failures,
                Exit::Failure(cause) => {
                    warn!(?cause, "finalizer failed");
                    failures.both(cause)
                }
            };
            join_all(fibers, failures)
        }),
        None => {
            if failures.is_empty() {
                Effect::unit()
            } else {
                Effect::fail_cause(failures)
            }
        }
    }
}
