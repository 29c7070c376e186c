//! Task launching and the per-task driver future.
//!
//! Every task runs inside [`run_task`], which:
//!
//! 1. Polls the body under a cancel check and a panic catch.
//! 2. Closes the task's body scope, cancelling the children if the body
//!    failed or was cancelled.
//! 3. Waits until the body scope drained.
//! 4. Retires the task in the registry, which settles the final outcome and
//!    propagates failures to the owning scope.
//! 5. Publishes the outcome to the header, waking joiners.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::record::{ScopeKind, TaskRecord};
use crate::runtime::builder::{Runtime, RuntimeInner};
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::raw_task::{RawTask, TaskHeader, TaskOutcome};
use crate::runtime::state::Wakeups;
use crate::runtime::task_handle::{Deferred, JobHandle};
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, Outcome, PanicPayload, ScopeId, TaskId};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, Waker};

/// When a task starts running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Start {
    /// Scheduled immediately.
    #[default]
    Eager,
    /// Scheduled by the first `start()` or `join()` on its handle.
    ///
    /// A lazy task nobody starts is cancelled, without running, once the code
    /// that launched it is done and it is all that keeps the scope open.
    Lazy,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TaskOptions {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) dispatcher: Option<Dispatcher>,
    pub(crate) start: Start,
}

/// Configures a task before launching it.
///
/// ```ignore
/// let answer = cx.scope()
///     .task()
///     .name("answer")
///     .dispatcher(Dispatcher::Io)
///     .start(Start::Lazy)
///     .spawn(|_cx| async { Ok(42) });
/// ```
#[derive(Debug)]
#[must_use = "a task builder does nothing until launch() or spawn() is called"]
pub struct TaskBuilder {
    rt: Runtime,
    scope: ScopeId,
    options: TaskOptions,
}

impl TaskBuilder {
    pub(crate) fn new(rt: Runtime, scope: ScopeId) -> Self {
        Self {
            rt,
            scope,
            options: TaskOptions::default(),
        }
    }

    /// Names the task for logs and handles.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(Arc::from(name.into()));
        self
    }

    /// Runs the task on `dispatcher` instead of the scope's.
    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.options.dispatcher = Some(dispatcher);
        self
    }

    /// Sets the start policy.
    pub fn start(mut self, start: Start) -> Self {
        self.options.start = start;
        self
    }

    /// Launches a task whose handle only reports completion.
    pub fn launch<F, Fut>(self, body: F) -> JobHandle
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let spawned = self.rt.inner().launch(self.scope, self.options, body);
        JobHandle::new(self.rt, spawned.header, spawned.raw)
    }

    /// Launches a task whose handle also yields its value.
    pub fn spawn<T, F, Fut>(self, body: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let spawned = self.rt.inner().launch(self.scope, self.options, body);
        Deferred::new(
            JobHandle::new(self.rt, spawned.header, spawned.raw),
            spawned.slot,
        )
    }
}

pub(crate) struct Spawned<T> {
    pub(crate) header: Arc<TaskHeader>,
    pub(crate) raw: Option<Arc<RawTask>>,
    pub(crate) slot: Arc<OnceLock<T>>,
}

impl RuntimeInner {
    /// Registers a task in `scope` and schedules it unless it is lazy.
    pub(crate) fn launch<T, F, Fut>(
        self: &Arc<Self>,
        scope: ScopeId,
        options: TaskOptions,
        body: F,
    ) -> Spawned<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let slot = Arc::new(OnceLock::new());
        let lazy = options.start == Start::Lazy;

        let mut state = self.state.lock();
        let Some(owner) = state.scope(scope) else {
            drop(state);
            debug!(scope = %scope, "launch into closed scope refused");
            let header = TaskHeader::refused(options.name, &CancelReason::parent_cancelled());
            return Spawned {
                header: Arc::new(header),
                raw: None,
                slot,
            };
        };
        let dispatcher = options
            .dispatcher
            .unwrap_or_else(|| owner.dispatcher.clone());
        let owner_cancelled = owner.is_cancelled();
        let (executor, preflight) = match self.resolve(&dispatcher) {
            Ok(executor) => (executor, None),
            Err(error) => (self.default_executor(), Some(error)),
        };

        let id = TaskId::from_arena(state.tasks.next_index());
        let header = Arc::new(TaskHeader::new(id, options.name, lazy));
        if owner_cancelled {
            header.request_cancel(&CancelReason::parent_cancelled());
        }
        debug!(
            task = %id,
            scope = %scope,
            dispatcher = dispatcher.name(),
            lazy,
            name = header.name().unwrap_or(""),
            "task spawned"
        );
        let body_scope = state.create_scope(ScopeKind::Body { task: id }, dispatcher.clone());
        let driver = run_task(
            Arc::clone(self),
            Arc::clone(&header),
            body_scope,
            dispatcher,
            preflight,
            Arc::clone(&slot),
            body,
        );
        let raw = RawTask::new(Arc::clone(&header), driver, executor);
        let record = TaskRecord::new(
            Arc::clone(&header),
            scope,
            body_scope,
            Waker::from(Arc::clone(&raw)),
        );
        let inserted = state.tasks.insert(record);
        debug_assert_eq!(inserted, id.arena_index());
        if let Some(owner) = state.scope_mut(scope) {
            owner.tasks.push(id);
        }
        drop(state);

        self.stats.record_spawn();
        if !lazy || owner_cancelled {
            raw.schedule();
        }
        Spawned {
            header,
            raw: Some(raw),
            slot,
        }
    }
}

async fn run_task<T, F, Fut>(
    rt: Arc<RuntimeInner>,
    header: Arc<TaskHeader>,
    body_scope: ScopeId,
    dispatcher: Dispatcher,
    preflight: Option<Error>,
    slot: Arc<OnceLock<T>>,
    body: F,
) where
    T: Send + Sync + 'static,
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let id = header.id();
    let body_outcome: TaskOutcome = match preflight {
        Some(error) => Outcome::Err(error),
        None => {
            let cx = Cx::new(
                Runtime::from_inner(Arc::clone(&rt)),
                Arc::clone(&header),
                body_scope,
                dispatcher,
            );
            let guarded = CancelGuard::new(
                Arc::clone(&header),
                CatchUnwind::new(async move { body(cx).await }),
            );
            match guarded.await {
                Err(reason) => Outcome::Cancelled(reason),
                Ok(Err(payload)) => Outcome::Panicked(payload),
                Ok(Ok(Ok(value))) => {
                    let _ = slot.set(value);
                    Outcome::Ok(())
                }
                Ok(Ok(Err(error))) if error.is_cancelled() => {
                    Outcome::Cancelled(header.cancel_reason().unwrap_or_default())
                }
                Ok(Ok(Err(error))) => Outcome::Err(error),
            }
        }
    };
    drop(slot);
    trace!(task = %id, outcome = ?body_outcome, "task body returned");

    let mut out = Wakeups::new();
    rt.state
        .lock()
        .close_body_scope(body_scope, &body_outcome, &mut out);
    rt.release(out);

    loop {
        ScopeDrained::new(&rt, body_scope).await;
        let mut out = Wakeups::new();
        let mut state = rt.state.lock();
        let finished = state.finish_task(id, body_outcome.clone(), &mut out);
        if let Some(outcome) = &finished {
            // Published under the lock so that a parent never observes its
            // scope drained while a child header is still non-terminal.
            rt.stats.record_finish(outcome);
            out.wakers.extend(header.complete(outcome.clone()));
        }
        drop(state);
        rt.release(out);
        if finished.is_some() {
            break;
        }
    }
    debug!(task = %id, state = %header.state(), "task finished");
}

/// Resolves once a scope has no live tasks or nested scopes left.
struct ScopeDrained<'a> {
    rt: &'a RuntimeInner,
    scope: ScopeId,
}

impl<'a> ScopeDrained<'a> {
    fn new(rt: &'a RuntimeInner, scope: ScopeId) -> Self {
        Self { rt, scope }
    }
}

impl Future for ScopeDrained<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.rt.state.lock();
        match state.scope_mut(self.scope) {
            Some(scope) if !scope.is_drained() => {
                scope.add_waiter(cx.waker());
                Poll::Pending
            }
            _ => Poll::Ready(()),
        }
    }
}

/// Polls the inner future only while its task has no cancel request.
///
/// Checked on every poll, so a cancelled task unwinds at its next wake-up.
/// The inner future is dropped on cancellation.
struct CancelGuard<F> {
    header: Arc<TaskHeader>,
    inner: Option<Pin<Box<F>>>,
}

impl<F> CancelGuard<F> {
    fn new(header: Arc<TaskHeader>, inner: F) -> Self {
        Self {
            header,
            inner: Some(Box::pin(inner)),
        }
    }
}

impl<F: Future> Future for CancelGuard<F> {
    type Output = std::result::Result<F::Output, CancelReason>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.header.is_cancel_requested() {
            self.inner = None;
            let reason = self.header.cancel_reason().unwrap_or_default();
            return Poll::Ready(Err(reason));
        }
        self.header.mark_active();
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(Err(CancelReason::default()));
        };
        match inner.as_mut().poll(cx) {
            Poll::Ready(output) => {
                self.inner = None;
                Poll::Ready(Ok(output))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Converts a panic inside the wrapped future into a [`PanicPayload`].
struct CatchUnwind<F>(Pin<Box<F>>);

impl<F> CatchUnwind<F> {
    fn new(inner: F) -> Self {
        Self(Box::pin(inner))
    }
}

impl<F: Future> Future for CatchUnwind<F> {
    type Output = std::result::Result<F::Output, PanicPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = self.0.as_mut();
        match catch_unwind(AssertUnwindSafe(|| inner.poll(cx))) {
            Ok(Poll::Pending) => Poll::Pending,
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Err(payload) => Poll::Ready(Err(PanicPayload::from_unwind(payload.as_ref()))),
        }
    }
}
