//! The worker pool multiplexing fibers onto threads.
//!
//! Workers pop fibers from the two-lane scheduler and run one fairness
//! slice each. A suspended fiber consumes no worker until it is
//! resumed. Idle workers park on a condition variable; the wakeup
//! notification is issued while holding the idle lock, so a fiber
//! enqueued between the emptiness check and the wait cannot be missed,
//! and a bounded wait re-checks the lanes as a second line of defense.

use crate::effect::primitive::Primitive;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::fiber::FiberRecord;
use crate::runtime::scheduler::Scheduler;
use crate::tracing_compat::{debug, trace};
use crate::types::env::Env;
use crate::types::flags::RuntimeFlags;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const IDLE_PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// State shared between the runtime handle and its workers.
pub(crate) struct ExecutorShared {
    scheduler: Scheduler,
    config: RuntimeConfig,
    idle_lock: Mutex<()>,
    idle_cvar: Condvar,
    shutdown: AtomicBool,
}

impl ExecutorShared {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        Self {
            scheduler: Scheduler::new(),
            config,
            idle_lock: Mutex::new(()),
            idle_cvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Creates a fiber record and schedules its first slice.
    pub(crate) fn spawn_fiber(
        self: &Arc<Self>,
        primitive: Primitive,
        env: Env,
        flags: RuntimeFlags,
    ) -> Arc<FiberRecord> {
        let record = FiberRecord::new(Arc::clone(self), env, flags, primitive);
        debug!(fiber = %record.id(), "fiber spawned");
        self.schedule(Arc::clone(&record));
        record
    }

    /// Enqueues a runnable fiber in the ready lane.
    pub(crate) fn schedule(&self, fiber: Arc<FiberRecord>) {
        self.scheduler.schedule(fiber);
        self.notify_one();
    }

    /// Enqueues a fiber woken by an interrupt request.
    pub(crate) fn schedule_interrupt(&self, fiber: Arc<FiberRecord>) {
        self.scheduler.schedule_interrupt(fiber);
        self.notify_one();
    }

    fn notify_one(&self) {
        if self.config.enable_parking {
            let _guard = self.idle_lock.lock();
            self.idle_cvar.notify_one();
        }
    }

    /// Signals workers to exit after their current slice.
    pub(crate) fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.idle_lock.lock();
        self.idle_cvar.notify_all();
    }

    fn worker_loop(&self) {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            if let Some(fiber) = self.scheduler.pop() {
                fiber.run();
            } else if self.config.enable_parking {
                let mut guard = self.idle_lock.lock();
                if self.scheduler.is_empty() && !self.shutdown.load(Ordering::Acquire) {
                    let _ = self.idle_cvar.wait_for(&mut guard, IDLE_PARK_TIMEOUT);
                }
            } else {
                std::thread::yield_now();
            }
        }
    }
}

/// Spawns the configured number of named worker threads.
pub(crate) fn start_workers(shared: &Arc<ExecutorShared>) -> Vec<JoinHandle<()>> {
    (0..shared.config.worker_threads)
        .map(|index| {
            let shared = Arc::clone(shared);
            std::thread::Builder::new()
                .name(format!("{}-{index}", shared.config.thread_name_prefix))
                .stack_size(shared.config.thread_stack_size)
                .spawn(move || {
                    trace!(worker = index, "worker started");
                    shared.worker_loop();
                    trace!(worker = index, "worker stopped");
                })
                .expect("failed to spawn worker thread")
        })
        .collect()
}
