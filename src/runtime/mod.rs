//! The fiber runtime: interpreter, scheduler, and submission surface.
//!
//! A [`Runtime`] owns a pool of worker threads multiplexing many fibers.
//! Submitting an effect creates a fiber and returns a [`Fiber`] handle;
//! [`Runtime::run`] additionally blocks the calling thread until the
//! fiber settles. Fibers suspended at `Async` instructions consume no
//! worker resources, and every fiber is forced back to the scheduler
//! after its fairness budget, so one spinning fiber cannot starve the
//! others.

pub mod builder;
pub mod config;
pub mod env_config;
pub(crate) mod executor;
pub(crate) mod fiber;
pub(crate) mod scheduler;

pub use builder::RuntimeBuilder;
pub use config::RuntimeConfig;
pub use fiber::{Fiber, FiberContext, FiberStatus};

use crate::effect::Effect;
use crate::tracing_compat::debug;
use crate::types::env::Env;
use crate::types::exit::Exit;
use crate::types::flags::RuntimeFlags;
use executor::ExecutorShared;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A pool of workers executing effect descriptions on fibers.
///
/// Dropping the runtime (or calling [`shutdown`](Runtime::shutdown))
/// stops the workers after their current slices; fibers still queued at
/// that point never settle, so join the fibers you care about first.
pub struct Runtime {
    shared: Arc<ExecutorShared>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Returns a builder for a customized runtime.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn with_config(mut config: RuntimeConfig) -> Self {
        config.normalize();
        let shared = Arc::new(ExecutorShared::new(config));
        let workers = executor::start_workers(&shared);
        debug!(workers = workers.len(), "runtime started");
        Self { shared, workers }
    }

    /// The runtime's normalized configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        self.shared.config()
    }

    /// Starts an effect on a new fiber with an empty environment.
    pub fn spawn<A, E>(&self, effect: Effect<A, E>) -> Fiber<A, E>
    where
        A: Send + 'static,
        E: Send + Sync + 'static,
    {
        self.spawn_with_env(effect, Env::new())
    }

    /// Starts an effect on a new fiber carrying the given environment.
    pub fn spawn_with_env<A, E>(&self, effect: Effect<A, E>, env: Env) -> Fiber<A, E>
    where
        A: Send + 'static,
        E: Send + Sync + 'static,
    {
        let record =
            self.shared
                .spawn_fiber(effect.into_primitive(), env, RuntimeFlags::default_flags());
        Fiber::from_record(record)
    }

    /// Runs an effect to completion, blocking the calling thread.
    ///
    /// Must not be called from a worker thread of this runtime.
    pub fn run<A, E>(&self, effect: Effect<A, E>) -> Exit<E, A>
    where
        A: Send + 'static,
        E: Send + Sync + 'static,
    {
        self.spawn(effect).join()
    }

    /// Runs an effect to completion with the given environment.
    pub fn run_with_env<A, E>(&self, effect: Effect<A, E>, env: Env) -> Exit<E, A>
    where
        A: Send + 'static,
        E: Send + Sync + 'static,
    {
        self.spawn_with_env(effect, env).join()
    }

    /// Stops the workers and waits for them to exit.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.shared.begin_shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}
