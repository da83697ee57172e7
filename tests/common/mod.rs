#![allow(dead_code)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use std::sync::Once;
use std::time::{Duration, Instant};
use weft::Runtime;

static INIT_LOGGING: Once = Once::new();

/// Initializes test logging once per process.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A runtime with two workers, for general scenario tests.
pub fn test_runtime() -> Runtime {
    init_logging();
    Runtime::builder().worker_threads(2).build()
}

/// A runtime with a single worker, for fairness-sensitive tests.
pub fn single_worker_runtime() -> Runtime {
    init_logging();
    Runtime::builder().worker_threads(1).build()
}

/// Polls `condition` until it holds or the timeout elapses.
///
/// # Panics
///
/// Panics when the timeout elapses first.
pub fn wait_until(what: &str, timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
