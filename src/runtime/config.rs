//! Runtime configuration.
//!
//! These types hold the concrete values that drive runtime behavior. In
//! most cases you should use [`RuntimeBuilder`](super::RuntimeBuilder)
//! to construct a runtime rather than creating a [`RuntimeConfig`]
//! directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `worker_threads` | available CPU parallelism |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"weft-worker"` |
//! | `yield_budget` | 2048 operations |
//! | `enable_parking` | true |
//! | `default_strategy` | `ExecutionStrategy::Sequential` |

use crate::scope::ExecutionStrategy;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads (default: available parallelism).
    pub worker_threads: usize,
    /// Stack size per worker thread (default: 2 MiB).
    pub thread_stack_size: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// Operations a fiber may execute before it is forced to yield back
    /// to the scheduler. The forced yield only applies to fibers with
    /// cooperative yielding enabled in their runtime flags.
    pub yield_budget: u32,
    /// Park idle workers on a condition variable instead of spinning.
    pub enable_parking: bool,
    /// Finalization strategy used when a scope closes without an
    /// explicit strategy.
    pub default_strategy: ExecutionStrategy,
}

impl RuntimeConfig {
    /// Normalizes configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = 2 * 1024 * 1024;
        }
        if self.yield_budget == 0 {
            self.yield_budget = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "weft-worker".to_string();
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism().map_or(1, usize::from),
            thread_stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "weft-worker".to_string(),
            yield_budget: 2048,
            enable_parking: true,
            default_strategy: ExecutionStrategy::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fixes_zeros() {
        let mut config = RuntimeConfig {
            worker_threads: 0,
            thread_stack_size: 0,
            thread_name_prefix: String::new(),
            yield_budget: 0,
            enable_parking: true,
            default_strategy: ExecutionStrategy::Sequential,
        };
        config.normalize();
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.yield_budget, 1);
        assert_eq!(config.thread_name_prefix, "weft-worker");
    }
}
