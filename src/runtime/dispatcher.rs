//! Dispatchers: where a task's polls run.
//!
//! A [`Dispatcher`] is a logical execution context. The runtime resolves it
//! to an [`Executor`] when a task is launched:
//!
//! | Dispatcher | Executor |
//! |------------|----------|
//! | `Default` | CPU-sized worker pool |
//! | `Io` | larger worker pool for tasks that block |
//! | `Unconfined` | whichever thread wakes the task |
//! | `Main` | executor installed by the host |
//! | `Custom` | any user-supplied executor |
//!
//! Precedence when launching: explicit dispatcher, then the one inherited from
//! the enclosing scope, then `Default`.

use crate::runtime::worker_pool::{WorkerPool, WorkerPoolOptions};
use core::fmt;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs jobs on some set of threads.
///
/// Hosts implement this to inject their own execution contexts, for example
/// a UI thread behind [`Dispatcher::Main`].
pub trait Executor: Send + Sync + 'static {
    /// Submits a job. Must not run it while holding locks the job may need.
    fn execute(&self, job: Job);

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Logical execution context for a task.
#[derive(Clone, Default)]
pub enum Dispatcher {
    /// Shared CPU-bound worker pool.
    #[default]
    Default,
    /// Worker pool sized for tasks that block on I/O.
    Io,
    /// No thread affinity: the task resumes on the thread that woke it.
    Unconfined,
    /// The host's designated main thread.
    Main,
    /// A user-supplied executor.
    Custom(Arc<dyn Executor>),
}

impl Dispatcher {
    /// Wraps an executor.
    #[must_use]
    pub fn custom(executor: Arc<dyn Executor>) -> Self {
        Self::Custom(executor)
    }

    /// Creates a dispatcher backed by one dedicated thread.
    ///
    /// The thread is started on first use and exits when the dispatcher and
    /// every task bound to it are dropped.
    #[must_use]
    pub fn single_thread(name: impl Into<String>) -> Self {
        let options = WorkerPoolOptions {
            thread_name_prefix: name.into(),
            idle_timeout: None,
            ..WorkerPoolOptions::default()
        };
        Self::Custom(Arc::new(WorkerPool::new(1, options)))
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Io => "io",
            Self::Unconfined => "unconfined",
            Self::Main => "main",
            Self::Custom(executor) => executor.name(),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dispatcher({})", self.name())
    }
}

thread_local! {
    static INLINE_QUEUE: RefCell<VecDeque<Job>> = const { RefCell::new(VecDeque::new()) };
    static INLINE_DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Clears the draining flag even if a job unwinds, so the next submission on
/// this thread drains instead of queueing forever.
struct DrainingGuard;

impl Drop for DrainingGuard {
    fn drop(&mut self) {
        INLINE_DRAINING.with(|draining| draining.set(false));
    }
}

/// Executor behind [`Dispatcher::Unconfined`].
///
/// Runs the job on the submitting thread. Submissions made while a job is
/// already running on this thread are queued and run after it returns, so
/// chains of wake-ups never grow the stack.
#[derive(Debug, Default)]
pub(crate) struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        INLINE_QUEUE.with(|queue| queue.borrow_mut().push_back(job));
        if INLINE_DRAINING.with(|draining| draining.replace(true)) {
            return;
        }
        let _draining = DrainingGuard;
        while let Some(next) = INLINE_QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
            next();
        }
    }

    fn name(&self) -> &str {
        "unconfined"
    }
}
