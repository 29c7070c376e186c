//! Runtime configuration types.
//!
//! These types hold the concrete values that drive runtime behavior. In most
//! cases you should use [`RuntimeBuilder`](super::builder::RuntimeBuilder) to
//! construct a runtime rather than creating a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `default_threads` | available CPU parallelism |
//! | `io_threads` | 64 |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"coscope-worker"` |
//! | `idle_timeout` | 10 s |
//! | `main_executor` | `None` |
//! | `uncaught_handler` | `None` (log at error level) |

use crate::error::Error;
use crate::runtime::builder::BuildError;
use crate::runtime::dispatcher::Executor;
use crate::runtime::worker_pool::{WorkerPoolOptions, DEFAULT_IDLE_TIMEOUT};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Smallest stack size accepted for worker threads.
pub const MIN_THREAD_STACK_SIZE: usize = 16 * 1024;

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_IO_THREADS: usize = 64;
const DEFAULT_PREFIX: &str = "coscope-worker";

/// Receives failures of global-scope tasks, which have no caller to
/// propagate to.
pub type UncaughtHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Runtime configuration.
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Threads in the pool behind `Dispatcher::Default` (default: available
    /// parallelism).
    pub default_threads: usize,
    /// Threads in the pool behind `Dispatcher::Io`.
    pub io_threads: usize,
    /// Stack size per worker thread (default: 2MB).
    pub thread_stack_size: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// How long an idle worker waits before exiting. `None` keeps workers
    /// alive until shutdown.
    pub idle_timeout: Option<Duration>,
    /// Callback executed when a worker thread starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback executed when a worker thread stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Executor behind `Dispatcher::Main`.
    pub main_executor: Option<Arc<dyn Executor>>,
    /// Handler for failures of global-scope tasks.
    pub uncaught_handler: Option<UncaughtHandler>,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.default_threads == 0 {
            self.default_threads = 1;
        }
        if self.io_threads == 0 {
            self.io_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_STACK_SIZE;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_PREFIX.to_string();
        }
    }

    /// Rejects values `normalize` cannot repair.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.thread_stack_size != 0 && self.thread_stack_size < MIN_THREAD_STACK_SIZE {
            return Err(BuildError::InvalidValue {
                field: "thread_stack_size",
                reason: format!(
                    "{} bytes is below the minimum of {MIN_THREAD_STACK_SIZE}",
                    self.thread_stack_size
                ),
            });
        }
        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(BuildError::InvalidValue {
                field: "idle_timeout",
                reason: "must be non-zero; use None to disable retirement".to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn default_worker_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }

    pub(crate) fn pool_options(&self, role: &str) -> WorkerPoolOptions {
        WorkerPoolOptions {
            idle_timeout: self.idle_timeout,
            thread_name_prefix: format!("{}-{role}", self.thread_name_prefix),
            thread_stack_size: self.thread_stack_size,
            on_thread_start: self.on_thread_start.clone(),
            on_thread_stop: self.on_thread_stop.clone(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_threads: Self::default_worker_threads(),
            io_threads: DEFAULT_IO_THREADS,
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: DEFAULT_PREFIX.to_string(),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            on_thread_start: None,
            on_thread_stop: None,
            main_executor: None,
            uncaught_handler: None,
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("default_threads", &self.default_threads)
            .field("io_threads", &self.io_threads)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("idle_timeout", &self.idle_timeout)
            .field("main_executor", &self.main_executor.as_ref().map(|e| e.name()))
            .field("uncaught_handler", &self.uncaught_handler.is_some())
            .finish_non_exhaustive()
    }
}
