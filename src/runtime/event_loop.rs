//! Single-thread event loop.
//!
//! [`run_blocking`](crate::run_blocking) turns the calling thread into an
//! event loop for the duration of the call, so that tasks inheriting its
//! dispatcher run on that thread. Hosts can also drive an `EventLoop` as
//! their "main" thread and install it with
//! [`Runtime::set_main_executor`](crate::runtime::Runtime::set_main_executor).

use crate::runtime::dispatcher::{Executor, Job};
use crate::time::deadline_after;
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A job queue drained by whichever thread calls one of the `run` methods.
pub struct EventLoop {
    name: String,
    queue: SegQueue<Job>,
    closed: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
    /// Receives jobs submitted after [`close`](Self::close).
    fallback: Option<Arc<dyn Executor>>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.name)
            .field("queued", &self.queue.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventLoop {
    /// Creates an open loop.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: SegQueue::new(),
            closed: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            fallback: None,
        }
    }

    /// Creates a loop that forwards jobs to `fallback` once closed.
    #[must_use]
    pub(crate) fn with_fallback(name: impl Into<String>, fallback: Arc<dyn Executor>) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::new(name)
        }
    }

    /// Runs queued jobs until `done` returns true.
    ///
    /// `done` is re-evaluated after every job and whenever the loop is woken,
    /// so anything that can flip it must also [`wake`](Self::wake) the loop.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        loop {
            while let Some(job) = self.queue.pop() {
                job();
            }
            if done() {
                return;
            }
            let mut guard = self.mutex.lock();
            if self.queue.is_empty() && !done() {
                self.condvar.wait(&mut guard);
            }
        }
    }

    /// Runs queued jobs until `timeout` elapses or the loop is closed.
    pub fn run_for(&self, timeout: Duration) {
        let deadline = deadline_after(timeout);
        loop {
            while let Some(job) = self.queue.pop() {
                job();
            }
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            if self.is_closed() || expired {
                return;
            }
            let mut guard = self.mutex.lock();
            if self.queue.is_empty() && !self.is_closed() {
                match deadline {
                    Some(deadline) => {
                        let _ = self.condvar.wait_until(&mut guard, deadline);
                    }
                    None => self.condvar.wait(&mut guard),
                }
            }
        }
    }

    /// Runs the jobs queued right now and returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.queue.pop() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wakes a thread blocked in one of the `run` methods.
    pub fn wake(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    /// Marks the loop closed; later jobs go to the fallback executor if one
    /// was configured.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(fallback) = &self.fallback {
            while let Some(job) = self.queue.pop() {
                fallback.execute(job);
            }
        }
        self.wake();
    }

    /// Returns true once [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Executor for EventLoop {
    fn execute(&self, job: Job) {
        if self.is_closed() {
            if let Some(fallback) = &self.fallback {
                fallback.execute(job);
                return;
            }
        }
        self.queue.push(job);
        self.wake();
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatcher::InlineExecutor;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_jobs_from_other_threads() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("runs_jobs_from_other_threads");
        let event_loop = Arc::new(EventLoop::new("main"));
        let counter = Arc::new(AtomicUsize::new(0));
        let loop_thread = std::thread::current().id();

        let submitter = {
            let event_loop = Arc::clone(&event_loop);
            let counter = Arc::clone(&counter);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    let counter = Arc::clone(&counter);
                    event_loop.execute(Box::new(move || {
                        assert_eq!(std::thread::current().id(), loop_thread);
                        counter.fetch_add(1, Ordering::SeqCst);
                    }));
                }
            })
        };

        event_loop.run_until(|| counter.load(Ordering::SeqCst) == 10);
        submitter.join().expect("submitter panicked");
        crate::assert_with_log!(
            counter.load(Ordering::SeqCst) == 10,
            "all jobs ran on the loop thread",
            10,
            counter.load(Ordering::SeqCst)
        );
        crate::test_complete!("runs_jobs_from_other_threads");
    }

    #[test]
    fn closed_loop_forwards_to_fallback() {
        let event_loop = EventLoop::with_fallback("root", Arc::new(InlineExecutor));
        event_loop.close();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        event_loop.execute(Box::new(move || ran_clone.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(event_loop.run_pending(), 0);
    }

    #[test]
    fn run_for_returns_after_timeout() {
        let event_loop = EventLoop::new("idle");
        let start = Instant::now();
        event_loop.run_for(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn unbounded_run_for_ends_on_close() {
        crate::test_utils::init_test_logging();
        let event_loop = Arc::new(EventLoop::new("unbounded"));
        let ran = Arc::new(AtomicBool::new(false));
        let closer = {
            let event_loop = Arc::clone(&event_loop);
            let ran = Arc::clone(&ran);
            std::thread::spawn(move || {
                let loop_handle = Arc::clone(&event_loop);
                event_loop.execute(Box::new(move || {
                    ran.store(true, Ordering::SeqCst);
                    loop_handle.close();
                }));
            })
        };
        event_loop.run_for(Duration::MAX);
        closer.join().expect("closer panicked");
        crate::assert_with_log!(
            ran.load(Ordering::SeqCst),
            "job ran before the loop closed",
            true,
            ran.load(Ordering::SeqCst)
        );
        assert!(event_loop.is_closed());
    }
}
