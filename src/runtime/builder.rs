//! Runtime builder and handles.
//!
//! ```ignore
//! let rt = RuntimeBuilder::new()
//!     .default_threads(4)
//!     .thread_name_prefix("app")
//!     .uncaught_handler(|err| eprintln!("lost failure: {err}"))
//!     .build()?;
//! let total = rt.run_blocking(|cx| async move {
//!     let a = cx.spawn(|_| async { Ok(20) });
//!     let b = cx.spawn(|_| async { Ok(22) });
//!     Ok(a.join().await? + b.join().await?)
//! })?;
//! ```

use crate::cx::Scope;
use crate::error::{Error, ErrorKind};
use crate::runtime::config::{RuntimeConfig, UncaughtHandler};
use crate::runtime::dispatcher::{Dispatcher, Executor, InlineExecutor};
use crate::runtime::env_config::apply_env_overrides;
use crate::runtime::state::{RuntimeState, Wakeups};
use crate::runtime::stats::{RuntimeStats, StatsCounters};
use crate::runtime::worker_pool::WorkerPool;
use crate::time::deadline_after;
use crate::tracing_compat::{debug, error, warn};
use crate::types::{CancelReason, ScopeId, TaskId};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::task::Waker;
use std::time::{Duration, Instant};

/// Errors produced while building a runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// What the variable must contain.
        expected: &'static str,
    },
    /// A configuration field is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Builder for constructing a runtime with custom configuration.
#[derive(Clone, Debug)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    /// Applies `COSCOPE_*` environment variables on top of the current
    /// settings. Later builder calls still override them.
    pub fn with_env_overrides(mut self) -> Result<Self, BuildError> {
        apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Set the number of threads behind `Dispatcher::Default`.
    #[must_use]
    pub fn default_threads(mut self, n: usize) -> Self {
        self.config.default_threads = n;
        self
    }

    /// Set the number of threads behind `Dispatcher::Io`.
    #[must_use]
    pub fn io_threads(mut self, n: usize) -> Self {
        self.config.io_threads = n;
        self
    }

    /// Set the stack size for worker threads.
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set how long idle workers linger; `None` keeps them until shutdown.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Register a callback to run when a worker thread starts.
    #[must_use]
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_start = Some(Arc::new(f));
        self
    }

    /// Register a callback to run when a worker thread stops.
    #[must_use]
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_stop = Some(Arc::new(f));
        self
    }

    /// Install the executor behind `Dispatcher::Main`.
    #[must_use]
    pub fn main_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.config.main_executor = Some(executor);
        self
    }

    /// Receive failures of global-scope tasks instead of logging them.
    #[must_use]
    pub fn uncaught_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.config.uncaught_handler = Some(Arc::new(f));
        self
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<Runtime, BuildError> {
        Runtime::with_config(self.config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// Runtime instance created from a [`RuntimeBuilder`].
///
/// Cheap to clone; clones share the same pools and task registry.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Runtime {
    /// Construct a runtime from the given configuration.
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self, BuildError> {
        config.validate()?;
        config.normalize();
        Ok(Self {
            inner: Arc::new(RuntimeInner::new(config)),
        })
    }

    /// The process-wide runtime, built on first use from defaults plus
    /// environment overrides.
    ///
    /// An invalid environment is logged and ignored.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| {
            RuntimeBuilder::new()
                .with_env_overrides()
                .and_then(RuntimeBuilder::build)
                .unwrap_or_else(|err| {
                    warn!(error = %err, "ignoring invalid runtime environment");
                    Self {
                        inner: Arc::new(RuntimeInner::new(RuntimeConfig::default())),
                    }
                })
        })
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<RuntimeInner> {
        &self.inner
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The unsupervised scope of this runtime.
    ///
    /// Tasks launched here have no parent: nothing cancels them except
    /// [`shutdown_global`](Self::shutdown_global) and their own handles, and
    /// their failures reach only the uncaught handler. Prefer structured
    /// scopes; reach for this only for work that must outlive its caller.
    #[must_use]
    pub fn global_scope(&self) -> Scope {
        let global = self.inner.state.lock().global;
        Scope::new(self.clone(), global)
    }

    /// Installs or replaces the executor behind `Dispatcher::Main`.
    ///
    /// Tasks already launched keep the executor they were bound to.
    pub fn set_main_executor(&self, executor: Arc<dyn Executor>) {
        *self.inner.main.write() = Some(executor);
    }

    /// Removes the `Dispatcher::Main` executor.
    pub fn clear_main_executor(&self) {
        *self.inner.main.write() = None;
    }

    /// Snapshot of the task counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        let live = self.inner.state.lock().tasks.len();
        self.inner.stats.snapshot(live)
    }

    /// Cancels every task in the global scope and waits up to `timeout` for
    /// them to terminate.
    ///
    /// Returns how many were still running when the wait ended. Blocks the
    /// calling thread; do not call it from a task.
    pub fn shutdown_global(&self, timeout: Duration) -> usize {
        let deadline = deadline_after(timeout);
        let headers = {
            let mut state = self.inner.state.lock();
            let headers = state.global_tasks();
            let mut out = Wakeups::new();
            let reason = CancelReason::shutdown();
            for header in &headers {
                state.cancel_task(header.id(), &reason, &mut out);
            }
            drop(state);
            self.inner.release(out);
            headers
        };
        debug!(tasks = headers.len(), "global scope shutting down");
        headers
            .iter()
            .filter(|header| {
                let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                !header.wait_blocking(remaining)
            })
            .count()
    }
}

/// Shared runtime internals.
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) state: Mutex<RuntimeState>,
    pub(crate) stats: StatsCounters,
    default_pool: Arc<WorkerPool>,
    io_pool: Arc<WorkerPool>,
    main: RwLock<Option<Arc<dyn Executor>>>,
    uncaught: Option<UncaughtHandler>,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig) -> Self {
        let default_pool = Arc::new(WorkerPool::new(
            config.default_threads,
            config.pool_options("default"),
        ));
        let io_pool = Arc::new(WorkerPool::new(config.io_threads, config.pool_options("io")));
        let main = RwLock::new(config.main_executor.clone());
        let uncaught = config.uncaught_handler.clone();
        debug!(
            default_threads = config.default_threads,
            io_threads = config.io_threads,
            "runtime created"
        );
        Self {
            config,
            state: Mutex::new(RuntimeState::new()),
            stats: StatsCounters::default(),
            default_pool,
            io_pool,
            main,
            uncaught,
        }
    }

    pub(crate) fn default_executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.default_pool) as Arc<dyn Executor>
    }

    /// Maps a dispatcher to the executor that will poll its tasks.
    pub(crate) fn resolve(&self, dispatcher: &Dispatcher) -> Result<Arc<dyn Executor>, Error> {
        match dispatcher {
            Dispatcher::Default => Ok(self.default_executor()),
            Dispatcher::Io => Ok(Arc::clone(&self.io_pool) as Arc<dyn Executor>),
            Dispatcher::Unconfined => Ok(Arc::new(InlineExecutor)),
            Dispatcher::Main => self.main.read().clone().ok_or_else(|| {
                Error::new(ErrorKind::MainDispatcherUnavailable)
                    .with_message("no executor installed for Dispatcher::Main")
            }),
            Dispatcher::Custom(executor) => Ok(Arc::clone(executor)),
        }
    }

    /// Fires the effects collected under the state lock.
    pub(crate) fn release(&self, out: Wakeups) {
        if out.is_empty() {
            return;
        }
        out.wakers.into_iter().for_each(Waker::wake);
        for failure in out.uncaught {
            match &self.uncaught {
                Some(handler) => handler(&failure),
                None => error!(
                    error = %failure,
                    task = ?failure.context().task_id,
                    "uncaught failure in global scope"
                ),
            }
        }
    }

    pub(crate) fn cancel_task(&self, id: TaskId, reason: &CancelReason) {
        let mut out = Wakeups::new();
        self.state.lock().cancel_task(id, reason, &mut out);
        self.release(out);
    }

    pub(crate) fn cancel_scope(&self, id: ScopeId, reason: &CancelReason) {
        let mut out = Wakeups::new();
        self.state.lock().cancel_scope(id, reason, &mut out);
        self.release(out);
        debug!(scope = %id, reason = %reason, "scope cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_runtime, wait_until};
    use crate::types::TaskState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn builder_rejects_invalid_stack() {
        let err = RuntimeBuilder::new()
            .thread_stack_size(512)
            .build()
            .expect_err("tiny stack accepted");
        assert!(err.to_string().contains("thread_stack_size"));
    }

    #[test]
    fn uncaught_handler_sees_global_failures() {
        init_test_logging();
        crate::test_phase!("uncaught_handler_sees_global_failures");
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let rt = RuntimeBuilder::new()
            .default_threads(1)
            .uncaught_handler(move |err| {
                assert_eq!(err.message(), Some("lost"));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .expect("runtime");
        let job = rt
            .global_scope()
            .launch(|_cx| async { Err(Error::user("lost")) });
        assert!(job.wait_blocking(Some(Duration::from_secs(5))));
        assert!(wait_until(Duration::from_secs(5), || seen.load(Ordering::SeqCst) == 1));
        crate::test_complete!("uncaught_handler_sees_global_failures");
    }

    #[test]
    fn shutdown_global_cancels_sleepers() {
        init_test_logging();
        let rt = test_runtime();
        let jobs: Vec<_> = (0..3)
            .map(|_| {
                rt.global_scope().launch(|_cx| async {
                    crate::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
            })
            .collect();
        assert!(wait_until(Duration::from_secs(5), || jobs
            .iter()
            .all(|j| j.state() == TaskState::Active)));
        assert_eq!(rt.shutdown_global(Duration::from_secs(5)), 0);
        for job in &jobs {
            assert_eq!(job.state(), TaskState::Cancelled);
        }
        let stats = rt.stats();
        assert_eq!(stats.cancelled, 3);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn main_executor_can_be_installed_later() {
        init_test_logging();
        let rt = test_runtime();
        rt.set_main_executor(Arc::new(InlineExecutor));
        let job = rt
            .global_scope()
            .task()
            .dispatcher(Dispatcher::Main)
            .launch(|_cx| async { Ok(()) });
        assert!(job.wait_blocking(Some(Duration::from_secs(5))));
        assert_eq!(job.state(), TaskState::Completed);
        rt.clear_main_executor();
        assert!(rt.inner().resolve(&Dispatcher::Main).is_err());
    }
}
