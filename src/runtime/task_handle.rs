//! Handles to launched tasks.
//!
//! A [`JobHandle`] is returned by `launch` and observes or cancels a task.
//! A [`Deferred`] is returned by `spawn` and also yields the task's value.
//!
//! # Ownership
//!
//! Handles do not own their task; the scope it was launched into does.
//! Dropping a handle neither cancels nor detaches the task.
//!
//! # Cancel Safety
//!
//! `join()` can be dropped and retried. The task keeps running regardless.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::builder::Runtime;
use crate::runtime::raw_task::{RawTask, TaskHeader, TaskOutcome};
use crate::types::{CancelReason, Outcome, TaskId, TaskState};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

/// Handle to a task launched with `launch`.
///
/// # Example
///
/// ```ignore
/// let job = cx.scope().launch(|cx| async move {
///     coscope::time::sleep(Duration::from_secs(5)).await;
///     Ok(())
/// });
/// let state = job.cancel_and_join().await;
/// assert_eq!(state, TaskState::Cancelled);
/// ```
#[derive(Clone)]
pub struct JobHandle {
    rt: Runtime,
    header: Arc<TaskHeader>,
    raw: Option<Arc<RawTask>>,
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.header.id())
            .field("name", &self.header.name())
            .field("state", &self.header.state())
            .finish()
    }
}

impl JobHandle {
    pub(crate) fn new(rt: Runtime, header: Arc<TaskHeader>, raw: Option<Arc<RawTask>>) -> Self {
        Self { rt, header, raw }
    }

    /// Returns the task ID.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.header.id()
    }

    /// Returns the task's name, if it was given one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.header.name()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.header.state()
    }

    /// True while the task runs and has not been asked to stop.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.header.state() == TaskState::Active && !self.header.is_cancel_requested()
    }

    /// True once the task reached a terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.header.is_terminal()
    }

    /// True once cancellation was requested or the task ended cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.header.is_cancel_requested() || self.header.state() == TaskState::Cancelled
    }

    /// The terminal outcome, once there is one.
    #[must_use]
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.header.outcome().cloned()
    }

    /// Starts a lazy task. Returns false if it was already started.
    pub fn start(&self) -> bool {
        if !self.header.mark_started() {
            return false;
        }
        if let Some(raw) = &self.raw {
            raw.schedule();
        }
        true
    }

    /// Requests cancellation of the task and everything it launched.
    ///
    /// The task observes the request at its next suspension point.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::user("cancelled through its handle"));
    }

    /// Like [`cancel`](Self::cancel) with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        self.rt.inner().cancel_task(self.header.id(), &reason);
    }

    /// Waits until the task is terminal, starting it if it is lazy.
    ///
    /// Returns `Ok` for a completed task and the task's failure otherwise;
    /// a cancelled task yields an error of kind `Cancelled`.
    pub async fn join(&self) -> Result<()> {
        self.start();
        Terminal::new(&self.header).await;
        self.settled_result()
    }

    /// Requests cancellation, then waits until the task is terminal.
    ///
    /// Never returns before the task terminated.
    pub async fn cancel_and_join(&self) -> TaskState {
        self.cancel();
        Terminal::new(&self.header).await;
        self.header.state()
    }

    /// Blocks the calling thread until the task is terminal.
    ///
    /// Starts a lazy task. Returns false if `timeout` elapsed first. Must not
    /// be called from a thread the task itself needs.
    pub fn wait_blocking(&self, timeout: Option<Duration>) -> bool {
        self.start();
        self.header.wait_blocking(timeout)
    }

    fn settled_result(&self) -> Result<()> {
        match self.header.outcome() {
            Some(outcome) => outcome.clone().into_result(),
            None => Err(Error::internal("join resolved before the task settled")),
        }
    }
}

/// Handle to a task launched with `spawn`, also yielding its value.
///
/// The value lives in a write-once slot: every `join` after completion
/// returns the same value.
///
/// ```ignore
/// let one = cx.scope().spawn(|_| async { Ok(compute_one()) });
/// let two = cx.scope().spawn(|_| async { Ok(compute_two()) });
/// let sum = one.join().await? + two.join().await?;
/// ```
pub struct Deferred<T> {
    job: JobHandle,
    slot: Arc<OnceLock<T>>,
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("job", &self.job)
            .field("has_value", &self.slot.get().is_some())
            .finish()
    }
}

impl<T> Deferred<T> {
    pub(crate) fn new(job: JobHandle, slot: Arc<OnceLock<T>>) -> Self {
        Self { job, slot }
    }

    /// The underlying job handle.
    #[must_use]
    pub fn job(&self) -> &JobHandle {
        &self.job
    }

    /// Returns the task ID.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.job.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.job.state()
    }

    /// Starts a lazy task. Returns false if it was already started.
    pub fn start(&self) -> bool {
        self.job.start()
    }

    /// Requests cancellation of the task.
    pub fn cancel(&self) {
        self.job.cancel();
    }

    /// The value, if the task already completed successfully.
    #[must_use]
    pub fn try_value(&self) -> Option<&T> {
        if self.job.header.outcome().is_some_and(Outcome::is_ok) {
            self.slot.get()
        } else {
            None
        }
    }

    /// Waits for the task and returns a clone of its value.
    ///
    /// Starts a lazy task. Repeated calls return identical values.
    ///
    /// # Errors
    ///
    /// The task's own failure, an error of kind `Cancelled` if it was
    /// cancelled, or `Panicked` if its body panicked.
    pub async fn join(&self) -> Result<T>
    where
        T: Clone,
    {
        self.job.join().await?;
        self.slot.get().cloned().ok_or_else(missing_value)
    }

    /// Waits for the task and takes its value out.
    ///
    /// # Errors
    ///
    /// As for [`join`](Self::join).
    pub async fn into_value(self) -> Result<T> {
        self.job.join().await?;
        let Self { job, slot } = self;
        drop(job);
        match Arc::try_unwrap(slot) {
            Ok(slot) => slot.into_inner().ok_or_else(missing_value),
            Err(_) => Err(Error::internal("value slot still shared")),
        }
    }
}

fn missing_value() -> Error {
    Error::new(ErrorKind::Internal).with_message("task completed without storing its value")
}

/// Resolves once a task header holds its outcome.
struct Terminal<'a> {
    header: &'a TaskHeader,
}

impl<'a> Terminal<'a> {
    fn new(header: &'a TaskHeader) -> Self {
        Self { header }
    }
}

impl Future for Terminal<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.header.poll_terminal(cx.waker())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::spawn::Start;
    use crate::test_utils::{init_test_logging, test_runtime};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn join_repeats_identical_value() {
        init_test_logging();
        crate::test_phase!("join_repeats_identical_value");
        let rt = test_runtime();
        let deferred = rt
            .global_scope()
            .spawn(|_cx| async { Ok(String::from("hello")) });
        let first = futures_lite::future::block_on(deferred.join()).expect("value");
        let second = futures_lite::future::block_on(deferred.join()).expect("value");
        assert_eq!(first, "hello");
        assert_eq!(first, second);
        let owned = futures_lite::future::block_on(deferred.into_value()).expect("value");
        assert_eq!(owned, "hello");
        crate::test_complete!("join_repeats_identical_value");
    }

    #[test]
    fn failure_surfaces_through_join() {
        init_test_logging();
        let rt = test_runtime();
        let deferred = rt
            .global_scope()
            .spawn(|_cx| async { Err::<u8, _>(Error::user("no answer")) });
        let err = futures_lite::future::block_on(deferred.join()).expect_err("failure");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.message(), Some("no answer"));
        assert_eq!(deferred.state(), TaskState::Failed);
    }

    #[test]
    fn lazy_task_waits_for_start() {
        init_test_logging();
        let rt = test_runtime();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let job = rt
            .global_scope()
            .task()
            .start(Start::Lazy)
            .launch(move |_cx| async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(job.state(), TaskState::Created);
        assert!(job.start());
        assert!(!job.start());
        assert!(job.wait_blocking(Some(Duration::from_secs(5))));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancelled_join_reports_cancelled_kind() {
        init_test_logging();
        let rt = test_runtime();
        let job = rt.global_scope().launch(|_cx| async {
            crate::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        let state = futures_lite::future::block_on(job.cancel_and_join());
        assert_eq!(state, TaskState::Cancelled);
        let err = futures_lite::future::block_on(job.join()).expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(job.is_cancelled());
        assert!(job.is_completed());
        assert!(!job.is_active());
    }
}
