//! Worker thread pool backing the `Default`, `Io` and single-thread
//! dispatchers.
//!
//! Threads are spawned lazily up to `max_threads`. A thread that stays idle
//! longer than the idle timeout retires; with no idle timeout it parks until
//! the pool shuts down. Jobs run in FIFO order.
//!
//! ```ignore
//! let pool = WorkerPool::new(4, WorkerPoolOptions::default());
//! pool.execute(Box::new(|| println!("hello from a worker")));
//! ```

use crate::runtime::dispatcher::{Executor, Job};
use crate::time::deadline_after;
use crate::tracing_compat::{error, trace};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::{Duration, Instant};

/// Default idle timeout before retiring a worker.
pub(crate) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

type ThreadCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration options for a worker pool.
#[derive(Clone)]
pub struct WorkerPoolOptions {
    /// Idle timeout before a worker retires; `None` keeps workers parked.
    pub idle_timeout: Option<Duration>,
    /// Thread name prefix.
    pub thread_name_prefix: String,
    /// Stack size per thread in bytes (0 = platform default).
    pub thread_stack_size: usize,
    /// Callback when a thread starts.
    pub on_thread_start: Option<ThreadCallback>,
    /// Callback when a thread stops.
    pub on_thread_stop: Option<ThreadCallback>,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            thread_name_prefix: "coscope".to_string(),
            thread_stack_size: 0,
            on_thread_start: None,
            on_thread_stop: None,
        }
    }
}

impl fmt::Debug for WorkerPoolOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPoolOptions")
            .field("idle_timeout", &self.idle_timeout)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .finish()
    }
}

/// A lazily-grown pool of worker threads.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    max_threads: usize,
    /// Threads currently alive.
    active_threads: AtomicUsize,
    /// Threads running a job or about to take one from the queue.
    busy_threads: AtomicUsize,
    /// Jobs waiting in the queue.
    pending_count: AtomicUsize,
    next_thread_id: AtomicUsize,
    queue: SegQueue<Job>,
    shutdown: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
    options: WorkerPoolOptions,
    thread_handles: Mutex<Vec<ThreadJoinHandle<()>>>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.options.thread_name_prefix)
            .field("max_threads", &self.inner.max_threads)
            .field("active_threads", &self.active_threads())
            .field("pending_jobs", &self.pending_count())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool that grows up to `max_threads` (at least one).
    #[must_use]
    pub fn new(max_threads: usize, options: WorkerPoolOptions) -> Self {
        let max_threads = max_threads.max(1);
        Self {
            inner: Arc::new(PoolInner {
                max_threads,
                active_threads: AtomicUsize::new(0),
                busy_threads: AtomicUsize::new(0),
                pending_count: AtomicUsize::new(0),
                next_thread_id: AtomicUsize::new(0),
                queue: SegQueue::new(),
                shutdown: AtomicBool::new(false),
                condvar: Condvar::new(),
                mutex: Mutex::new(()),
                options,
                thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
            }),
        }
    }

    /// Returns the number of queued jobs.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns the number of live worker threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }

    /// Returns the configured thread limit.
    #[must_use]
    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    /// Returns `true` once the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Stops accepting new jobs and wakes parked workers.
    ///
    /// Queued jobs still run before the workers exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify_all();
    }

    /// Shuts down and waits for all workers to exit.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = deadline_after(timeout);
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining =
                deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()));
            if remaining.is_zero() {
                return false;
            }
            self.inner.notify_all();
            thread::sleep(Duration::from_millis(5).min(remaining));
        }
        let handles: Vec<_> = self.inner.thread_handles.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        true
    }
}

impl Executor for WorkerPool {
    fn execute(&self, job: Job) {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            // Late wake-ups after shutdown still need to make progress.
            job();
            return;
        }
        inner.queue.push(job);
        inner.pending_count.fetch_add(1, Ordering::SeqCst);
        let spawn = {
            let _guard = inner.mutex.lock();
            inner.condvar.notify_one();
            reserve_thread(inner)
        };
        if spawn {
            spawn_thread(inner);
        }
    }

    fn name(&self) -> &str {
        &self.inner.options.thread_name_prefix
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let current = thread::current().id();
        let on_own_worker = self
            .inner
            .thread_handles
            .lock()
            .iter()
            .any(|h| h.thread().id() == current);
        if on_own_worker {
            // The last handle went away inside one of our jobs; the workers
            // exit once they see the flag.
            self.shutdown();
        } else {
            let _ = self.shutdown_and_wait(Duration::from_secs(5));
        }
    }
}

impl PoolInner {
    fn notify_all(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Claims a thread slot when more jobs are queued than there are idle
/// workers to take them. A reserved thread counts as idle until it starts
/// on a job.
///
/// Called with `mutex` held so the decision is serialized with workers
/// retiring.
fn reserve_thread(inner: &PoolInner) -> bool {
    let active = inner.active_threads.load(Ordering::SeqCst);
    let busy = inner.busy_threads.load(Ordering::SeqCst);
    let pending = inner.pending_count.load(Ordering::SeqCst);
    let idle = active.saturating_sub(busy);
    if active < inner.max_threads && pending > idle {
        inner.active_threads.fetch_add(1, Ordering::AcqRel);
        true
    } else {
        false
    }
}

fn spawn_thread(inner: &Arc<PoolInner>) {
    let worker = Arc::clone(inner);
    let id = inner.next_thread_id.fetch_add(1, Ordering::Relaxed);
    let name = if inner.max_threads == 1 {
        inner.options.thread_name_prefix.clone()
    } else {
        format!("{}-{id}", inner.options.thread_name_prefix)
    };

    let mut builder = thread::Builder::new().name(name.clone());
    if inner.options.thread_stack_size > 0 {
        builder = builder.stack_size(inner.options.thread_stack_size);
    }

    let spawned = builder.spawn(move || {
        trace!(thread = %name, "worker thread started");
        if let Some(callback) = &worker.options.on_thread_start {
            callback();
        }
        worker_loop(&worker);
        if let Some(callback) = &worker.options.on_thread_stop {
            callback();
        }
        trace!(thread = %name, "worker thread stopped");
    });

    match spawned {
        Ok(handle) => {
            let mut handles = inner.thread_handles.lock();
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
        Err(err) => {
            inner.active_threads.fetch_sub(1, Ordering::AcqRel);
            error!(error = %err, "failed to spawn worker thread");
            if inner.active_threads.load(Ordering::Acquire) == 0 {
                // Nobody else will drain the queue.
                drain_inline(inner);
            }
        }
    }
}

fn drain_inline(inner: &PoolInner) {
    while let Some(job) = inner.queue.pop() {
        inner.pending_count.fetch_sub(1, Ordering::Relaxed);
        job();
    }
}

/// Runs jobs until shutdown or idle retirement. Releases the thread's slot
/// in `active_threads` before returning.
fn worker_loop(inner: &PoolInner) {
    loop {
        // Count as busy before popping so a submitter never sees the job
        // leave the queue while this worker still looks idle.
        inner.busy_threads.fetch_add(1, Ordering::SeqCst);
        if let Some(job) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::SeqCst);
            job();
            inner.busy_threads.fetch_sub(1, Ordering::SeqCst);
            continue;
        }
        inner.busy_threads.fetch_sub(1, Ordering::SeqCst);

        let mut guard = inner.mutex.lock();
        // Re-check under the lock so a push between pop and wait is not lost.
        if !inner.queue.is_empty() {
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            inner.active_threads.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        match inner.options.idle_timeout {
            Some(timeout) => {
                let result = inner.condvar.wait_for(&mut guard, timeout);
                if result.timed_out()
                    && inner.queue.is_empty()
                    && !inner.shutdown.load(Ordering::Acquire)
                {
                    inner.active_threads.fetch_sub(1, Ordering::AcqRel);
                    return;
                }
            }
            None => inner.condvar.wait(&mut guard),
        }
    }
}
