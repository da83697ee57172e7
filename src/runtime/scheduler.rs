//! Two-lane run queue.
//!
//! The scheduler uses two lanes:
//! 1. Interrupt lane (highest priority) - fibers woken by an interrupt
//!    request, so they reach their interruptible checkpoint promptly.
//! 2. Ready lane - all other runnable fibers.
//!
//! Both lanes are lock-free queues shared by every worker. A fiber that
//! is popped while not in the `Ready` phase is a stale wakeup and is
//! ignored by the interpreter, so occasional double-scheduling is
//! harmless.

use crate::runtime::fiber::FiberRecord;
use crossbeam_queue::SegQueue;
use std::sync::Arc;

/// The two-lane scheduler.
#[derive(Default)]
pub(crate) struct Scheduler {
    /// Interrupt lane: fibers with a freshly delivered interrupt.
    interrupt_lane: SegQueue<Arc<FiberRecord>>,
    /// Ready lane: general runnable fibers.
    ready_lane: SegQueue<Arc<FiberRecord>>,
}

impl Scheduler {
    /// Creates a new empty scheduler.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules a fiber in the ready lane.
    pub(crate) fn schedule(&self, fiber: Arc<FiberRecord>) {
        self.ready_lane.push(fiber);
    }

    /// Schedules a fiber in the interrupt lane.
    pub(crate) fn schedule_interrupt(&self, fiber: Arc<FiberRecord>) {
        self.interrupt_lane.push(fiber);
    }

    /// Pops the next fiber to run.
    ///
    /// Order: interrupt lane before ready lane.
    pub(crate) fn pop(&self) -> Option<Arc<FiberRecord>> {
        self.interrupt_lane.pop().or_else(|| self.ready_lane.pop())
    }

    /// Returns true if no fibers are queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.interrupt_lane.is_empty() && self.ready_lane.is_empty()
    }
}
