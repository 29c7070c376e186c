//! Type-erased task storage and scheduling.
//!
//! A [`RawTask`] owns a task's boxed future and a small scheduling state
//! machine. It is its own [`Waker`]: waking it submits one poll job to the
//! task's executor. A wake that arrives while the task is being polled is
//! remembered and turns into a reschedule once the poll returns, so a task
//! is never polled on two threads at once.
//!
//! [`TaskHeader`] is the part of a task shared with handles: identity,
//! lifecycle state, cancellation flag and the write-once outcome.

use crate::error::Error;
use crate::runtime::context::CurrentTaskGuard;
use crate::runtime::dispatcher::Executor;
use crate::time::deadline_after;
use crate::types::{CancelReason, Outcome, TaskId, TaskState};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

/// Outcome stored in every task header; the value of a `Deferred` lives in a
/// separate typed slot.
pub(crate) type TaskOutcome = Outcome<(), Error>;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const NOTIFIED: u8 = 3;
const DONE: u8 = 4;

/// Shared, handle-visible part of a task.
pub(crate) struct TaskHeader {
    id: TaskId,
    name: Option<Arc<str>>,
    lazy: bool,
    state: AtomicU8,
    started: AtomicBool,
    cancel_requested: AtomicBool,
    cancel_reason: Mutex<Option<CancelReason>>,
    outcome: OnceLock<TaskOutcome>,
    waiters: Mutex<Vec<Waker>>,
    done: Condvar,
}

impl fmt::Debug for TaskHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHeader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancel_requested())
            .finish()
    }
}

impl TaskHeader {
    pub(crate) fn new(id: TaskId, name: Option<Arc<str>>, lazy: bool) -> Self {
        Self {
            id,
            name,
            lazy,
            state: AtomicU8::new(TaskState::Created.as_u8()),
            started: AtomicBool::new(!lazy),
            cancel_requested: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            outcome: OnceLock::new(),
            waiters: Mutex::new(Vec::new()),
            done: Condvar::new(),
        }
    }

    /// A header that is terminal from the start, for launches that were
    /// refused.
    pub(crate) fn refused(name: Option<Arc<str>>, reason: &CancelReason) -> Self {
        let header = Self::new(TaskId::new_detached(), name, false);
        header.request_cancel(reason);
        header.complete(Outcome::Cancelled(reason.clone()));
        header
    }

    pub(crate) const fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) const fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_active(&self) {
        let _ = self.state.compare_exchange(
            TaskState::Created.as_u8(),
            TaskState::Active.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Marks a lazy task started. Returns true on the first call.
    pub(crate) fn mark_started(&self) -> bool {
        !self.started.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub(crate) fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason.lock().clone()
    }

    /// Records a cancellation request, keeping the strongest reason.
    ///
    /// Returns true if this is the first request.
    pub(crate) fn request_cancel(&self, reason: &CancelReason) -> bool {
        let mut slot = self.cancel_reason.lock();
        match slot.as_mut() {
            Some(existing) => {
                existing.strengthen(reason);
                false
            }
            None => {
                *slot = Some(reason.clone());
                self.cancel_requested.store(true, Ordering::Release);
                true
            }
        }
    }

    pub(crate) fn outcome(&self) -> Option<&TaskOutcome> {
        self.outcome.get()
    }

    pub(crate) fn is_terminal(&self) -> bool {
        self.outcome.get().is_some()
    }

    /// Stores the terminal outcome and returns the wakers to notify.
    ///
    /// The outcome slot is write-once; a second call leaves the first
    /// outcome in place.
    pub(crate) fn complete(&self, outcome: TaskOutcome) -> Vec<Waker> {
        let state = match &outcome {
            Outcome::Ok(()) => TaskState::Completed,
            Outcome::Err(_) | Outcome::Panicked(_) => TaskState::Failed,
            Outcome::Cancelled(_) => TaskState::Cancelled,
        };
        if self.outcome.set(outcome).is_err() {
            return Vec::new();
        }
        self.state.store(state.as_u8(), Ordering::Release);
        let mut waiters = self.waiters.lock();
        self.done.notify_all();
        std::mem::take(&mut *waiters)
    }

    /// Registers `waker` unless the task is already terminal.
    pub(crate) fn poll_terminal(&self, waker: &Waker) -> Poll<()> {
        let mut waiters = self.waiters.lock();
        if self.outcome.get().is_some() {
            return Poll::Ready(());
        }
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
        Poll::Pending
    }

    /// Blocks the calling thread until the task is terminal.
    ///
    /// Returns false if `timeout` elapsed first. A timeout too large for
    /// `Instant` waits without limit.
    pub(crate) fn wait_blocking(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(deadline_after);
        let mut waiters = self.waiters.lock();
        while self.outcome.get().is_none() {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut waiters, deadline).timed_out() {
                        return self.outcome.get().is_some();
                    }
                }
                None => self.done.wait(&mut waiters),
            }
        }
        true
    }
}

/// A scheduled, type-erased task.
pub(crate) struct RawTask {
    header: Arc<TaskHeader>,
    future: Mutex<Option<BoxFuture>>,
    schedule: AtomicU8,
    executor: Arc<dyn Executor>,
}

impl RawTask {
    pub(crate) fn new<F>(header: Arc<TaskHeader>, future: F, executor: Arc<dyn Executor>) -> Arc<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Arc::new(Self {
            header,
            future: Mutex::new(Some(Box::pin(future))),
            schedule: AtomicU8::new(IDLE),
            executor,
        })
    }

    pub(crate) fn header(&self) -> &Arc<TaskHeader> {
        &self.header
    }

    /// Requests a poll on the task's executor.
    pub(crate) fn schedule(self: &Arc<Self>) {
        let mut current = self.schedule.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => SCHEDULED,
                RUNNING => NOTIFIED,
                _ => return,
            };
            match self.schedule.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if next == SCHEDULED {
                        self.submit();
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn submit(self: &Arc<Self>) {
        let task = Arc::clone(self);
        self.executor.execute(Box::new(move || task.run()));
    }

    /// Polls the task once on the current thread.
    fn run(self: Arc<Self>) {
        self.schedule.store(RUNNING, Ordering::Release);
        let waker = Waker::from(Arc::clone(&self));
        let mut cx = Context::from_waker(&waker);

        let finished = {
            let _current = CurrentTaskGuard::enter(Arc::clone(&self.header));
            let mut slot = self.future.lock();
            match slot.as_mut() {
                None => true,
                Some(future) => match future.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => {
                        *slot = None;
                        true
                    }
                    Poll::Pending => false,
                },
            }
        };

        if finished {
            self.schedule.store(DONE, Ordering::Release);
            return;
        }
        if self
            .schedule
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Woken during the poll: go to the back of the executor's queue.
            self.schedule.store(SCHEDULED, Ordering::Release);
            self.submit();
        }
    }
}

impl Wake for RawTask {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

impl fmt::Debug for RawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTask")
            .field("header", &self.header)
            .field("schedule", &self.schedule.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dispatcher::InlineExecutor;
    use crate::types::PanicPayload;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn outcome_is_write_once() {
        let header = TaskHeader::new(TaskId::new_for_test(1, 0), None, false);
        let _ = header.complete(Outcome::Ok(()));
        let _ = header.complete(Outcome::Panicked(PanicPayload::new("late")));
        assert!(header.outcome().is_some_and(Outcome::is_ok));
        assert_eq!(header.state(), TaskState::Completed);
    }

    #[test]
    fn cancel_reason_strengthens() {
        let header = TaskHeader::new(TaskId::new_for_test(1, 0), None, false);
        assert!(header.request_cancel(&CancelReason::user("stop")));
        assert!(!header.request_cancel(&CancelReason::shutdown()));
        assert_eq!(
            header.cancel_reason().map(|r| r.kind()),
            Some(crate::types::CancelKind::Shutdown)
        );
    }

    #[test]
    fn refused_header_is_cancelled() {
        let header = TaskHeader::refused(Some(Arc::from("late")), &CancelReason::parent_cancelled());
        assert_eq!(header.state(), TaskState::Cancelled);
        assert!(header.wait_blocking(Some(Duration::from_millis(1))));
        assert_eq!(header.name(), Some("late"));
    }

    #[test]
    fn wait_blocking_times_out() {
        let header = TaskHeader::new(TaskId::new_for_test(1, 0), None, false);
        assert!(!header.wait_blocking(Some(Duration::from_millis(5))));
    }

    struct YieldOnce {
        yielded: bool,
    }

    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if self.yielded {
                Poll::Ready(())
            } else {
                self.yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }

    #[test]
    fn self_wake_reschedules_instead_of_recursing() {
        let header = Arc::new(TaskHeader::new(TaskId::new_for_test(1, 0), None, false));
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let fut = async move {
            counter.fetch_add(1, Ordering::SeqCst);
            YieldOnce { yielded: false }.await;
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let task = RawTask::new(header, fut, Arc::new(InlineExecutor));
        task.schedule();
        assert_eq!(polls.load(Ordering::SeqCst), 2);
        assert_eq!(task.schedule.load(Ordering::SeqCst), DONE);
    }
}
