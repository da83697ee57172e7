//! Environment variable support for [`RuntimeBuilder`](super::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic** — values set via builder methods after
//!    [`from_env`](super::RuntimeBuilder::from_env)
//! 2. **Environment variables** — values from `WEFT_*` env vars
//! 3. **Defaults** — built-in defaults from [`RuntimeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `WEFT_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `WEFT_THREAD_STACK_SIZE` | `usize` | `thread_stack_size` |
//! | `WEFT_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `WEFT_YIELD_BUDGET` | `u32` | `yield_budget` |
//! | `WEFT_ENABLE_PARKING` | `bool` | `enable_parking` |

use crate::error::ConfigError;
use crate::runtime::config::RuntimeConfig;

/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "WEFT_WORKER_THREADS";
/// Environment variable name for thread stack size.
pub const ENV_THREAD_STACK_SIZE: &str = "WEFT_THREAD_STACK_SIZE";
/// Environment variable name for thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "WEFT_THREAD_NAME_PREFIX";
/// Environment variable name for the cooperative yield budget.
pub const ENV_YIELD_BUDGET: &str = "WEFT_YIELD_BUDGET";
/// Environment variable name for the idle-worker parking toggle.
pub const ENV_ENABLE_PARKING: &str = "WEFT_ENABLE_PARKING";

/// Applies environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied. Returns
/// an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_STACK_SIZE) {
        config.thread_stack_size = parse_usize(ENV_THREAD_STACK_SIZE, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_YIELD_BUDGET) {
        config.yield_budget = parse_u32(ENV_YIELD_BUDGET, &val)?;
    }
    if let Some(val) = read_env(ENV_ENABLE_PARKING) {
        config.enable_parking = parse_bool(ENV_ENABLE_PARKING, &val)?;
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_u32(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: "expected a 32-bit non-negative integer".to_string(),
    })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean (true/false, 1/0, yes/no, on/off)".to_string(),
        }),
    }
}
