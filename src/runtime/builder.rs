//! Runtime builder.

use crate::error::ConfigError;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::env_config;
use crate::runtime::Runtime;
use crate::scope::ExecutionStrategy;

/// Builder for constructing a runtime with custom configuration.
#[derive(Debug, Clone)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Creates a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Sets the worker thread stack size.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Sets the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Sets the operation budget before a fiber is forced to yield.
    #[must_use]
    pub fn yield_budget(mut self, budget: u32) -> Self {
        self.config.yield_budget = budget;
        self
    }

    /// Enables or disables parking for idle workers.
    #[must_use]
    pub fn enable_parking(mut self, enable: bool) -> Self {
        self.config.enable_parking = enable;
        self
    }

    /// Sets the default finalization strategy for closing scopes.
    #[must_use]
    pub fn default_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// Applies `WEFT_*` environment variable overrides on top of the
    /// current configuration.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Builds the runtime, normalizing the configuration and starting
    /// its worker threads.
    #[must_use]
    pub fn build(self) -> Runtime {
        Runtime::with_config(self.config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
