//! Scopes: the owners of launched tasks.
//!
//! A [`Scope`] is a handle to a registry scope. Tasks launched through it
//! are owned by that scope, and the scope's owner does not finish before
//! they do:
//!
//! - a task's body scope holds its children, and the task stays `Active`
//!   until they are terminal;
//! - a nested scope opened by [`Scope::with_scope`] holds the tasks its body
//!   launched, and the `with_scope` future resolves only once they are
//!   terminal;
//! - the global scope has no owner and is never cancelled from outside.
//!
//! # Failure
//!
//! The first failing child of a scope cancels its siblings. For a body scope
//! the failure also fails the task; for a nested scope it is returned from
//! `with_scope`.
//!
//! ```ignore
//! let total = cx.with_scope(|cx| async move {
//!     let a = cx.spawn(|_| async { Ok(fetch_a().await?) });
//!     let b = cx.spawn(|_| async { Ok(fetch_b().await?) });
//!     Ok(a.join().await? + b.join().await?)
//! }).await?;
//! ```

use crate::cx::Cx;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::builder::Runtime;
use crate::runtime::context::current_task;
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::raw_task::TaskHeader;
use crate::runtime::spawn::TaskBuilder;
use crate::runtime::state::Wakeups;
use crate::runtime::task_handle::{Deferred, JobHandle};
use crate::time::Sleep;
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{CancelReason, ScopeId, TaskId};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Handle for launching tasks into a scope.
#[derive(Clone)]
pub struct Scope {
    rt: Runtime,
    id: ScopeId,
    owner: Option<Arc<TaskHeader>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("owner", &self.owner.as_ref().map(|h| h.id()))
            .finish()
    }
}

impl Scope {
    pub(crate) fn new(rt: Runtime, id: ScopeId) -> Self {
        Self { rt, id, owner: None }
    }

    pub(crate) fn with_owner(rt: Runtime, id: ScopeId, owner: Arc<TaskHeader>) -> Self {
        Self {
            rt,
            id,
            owner: Some(owner),
        }
    }

    /// Returns the scope ID.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// True once the scope was cancelled or has been closed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rt
            .inner()
            .state
            .lock()
            .scope(self.id)
            .map_or(true, |scope| scope.is_cancelled())
    }

    /// Starts configuring a task in this scope.
    pub fn task(&self) -> TaskBuilder {
        TaskBuilder::new(self.rt.clone(), self.id)
    }

    /// Launches a task that inherits the scope's dispatcher.
    pub fn launch<F, Fut>(&self, body: F) -> JobHandle
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.task().launch(body)
    }

    /// Launches a task on `dispatcher`.
    pub fn launch_on<F, Fut>(&self, dispatcher: Dispatcher, body: F) -> JobHandle
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.task().dispatcher(dispatcher).launch(body)
    }

    /// Launches a task that produces a value.
    pub fn spawn<T, F, Fut>(&self, body: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.task().spawn(body)
    }

    /// Launches a task that produces a value, on `dispatcher`.
    pub fn spawn_on<T, F, Fut>(&self, dispatcher: Dispatcher, body: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.task().dispatcher(dispatcher).spawn(body)
    }

    /// Opens a scope nested in this one and runs `body` in it.
    ///
    /// See [`Cx::with_scope`]. Called outside of any task, the body gets a
    /// context of its own that only the nested scope can cancel.
    pub fn with_scope<T, F, Fut>(&self, body: F) -> NestedScope<T>
    where
        T: Send + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        NestedScope::open(self.rt.clone(), self.id, self.owner.clone(), body)
    }

    /// Like [`with_scope`](Self::with_scope) with a deadline.
    pub fn with_timeout<T, F, Fut>(&self, after: Duration, body: F) -> WithTimeout<T>
    where
        T: Send + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        WithTimeout::new(self.with_scope(body), after)
    }

    /// Cancels every task in the scope and, recursively, their children.
    ///
    /// The global scope cannot be cancelled; use
    /// [`Runtime::shutdown_global`] to drain it.
    pub fn cancel(&self, reason: CancelReason) {
        let is_global = self.rt.inner().state.lock().global == self.id;
        if is_global {
            warn!(scope = %self.id, "ignoring cancel of the global scope");
            return;
        }
        self.rt.inner().cancel_scope(self.id, &reason);
    }
}

/// Future returned by `with_scope`.
///
/// Dropping it before it resolves cancels the nested scope; the scope is
/// still drained before its parent can finish.
#[must_use = "futures do nothing unless polled"]
pub struct NestedScope<T> {
    rt: Runtime,
    id: Option<ScopeId>,
    body: Option<BoxFuture<T>>,
    body_result: Option<Result<T>>,
    done: bool,
}

impl<T> Unpin for NestedScope<T> {}

impl<T> fmt::Debug for NestedScope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedScope")
            .field("id", &self.id)
            .field("body_running", &self.body.is_some())
            .field("done", &self.done)
            .finish()
    }
}

impl<T: Send + 'static> NestedScope<T> {
    pub(crate) fn open<F, Fut>(
        rt: Runtime,
        parent: ScopeId,
        caller: Option<Arc<TaskHeader>>,
        body: F,
    ) -> Self
    where
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let opened = {
            let mut state = rt.inner().state.lock();
            let id = state.open_nested(parent);
            id.and_then(|id| state.scope(id).map(|scope| (id, scope.dispatcher.clone())))
        };
        let Some((id, dispatcher)) = opened else {
            debug!(parent = %parent, "with_scope on a closed scope");
            return Self {
                rt,
                id: None,
                body: None,
                body_result: None,
                done: false,
            };
        };
        trace!(scope = %id, parent = %parent, "nested scope opened");

        let header = caller
            .or_else(current_task)
            .unwrap_or_else(|| Arc::new(TaskHeader::new(TaskId::new_detached(), None, false)));
        let cx = Cx::new(rt.clone(), header, id, dispatcher);
        Self {
            rt,
            id: Some(id),
            body: Some(Box::pin(body(cx))),
            body_result: None,
            done: false,
        }
    }
}

impl<T> NestedScope<T> {
    fn cancel(&self, reason: &CancelReason) {
        if let Some(id) = self.id {
            self.rt.inner().cancel_scope(id, reason);
        }
    }

    /// Marks the scope closing once the body is gone, cancelling the
    /// children if the body failed.
    fn close_body(&self, id: ScopeId, failed: bool) {
        let mut out = Wakeups::new();
        let mut state = self.rt.inner().state.lock();
        if failed {
            state.cancel_scope(id, &CancelReason::sibling_failed(), &mut out);
        }
        if let Some(scope) = state.scope_mut(id) {
            scope.closing = true;
        }
        state.apply_lazy_rule(id, &mut out);
        drop(state);
        self.rt.inner().release(out);
    }

    fn settle(&mut self, id: ScopeId) -> Result<T> {
        let mut out = Wakeups::new();
        let closed = self.rt.inner().state.lock().close_nested(id, &mut out);
        self.rt.inner().release(out);
        self.done = true;
        trace!(scope = %id, "nested scope closed");

        let Some(closed) = closed else {
            return Err(Error::internal("nested scope vanished before it closed"));
        };
        match (self.body_result.take(), closed.first_failure, closed.cancel) {
            (Some(Err(error)), _, _) if !error.is_cancelled() => Err(error),
            (_, Some(failure), _) => Err(failure),
            (Some(Ok(value)), None, None) => Ok(value),
            (Some(Err(error)), None, _) => Err(error),
            (_, None, cancel) => Err(Error::cancelled(&cancel.unwrap_or_default())),
        }
    }
}

impl<T> Future for NestedScope<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let Some(id) = this.id else {
            this.done = true;
            return Poll::Ready(Err(Error::new(ErrorKind::ScopeClosed)
                .with_message("the enclosing scope already finished")));
        };
        if this.done {
            return Poll::Ready(Err(Error::internal("nested scope polled after completion")));
        }

        loop {
            let polled = match this.body.as_mut() {
                Some(body) => body.as_mut().poll(cx),
                None => Poll::Pending,
            };
            if let Poll::Ready(result) = polled {
                this.body = None;
                let failed = matches!(&result, Err(error) if !error.is_cancelled());
                this.body_result = Some(result);
                this.close_body(id, failed);
            }

            let mut state = this.rt.inner().state.lock();
            let Some(scope) = state.scope_mut(id) else {
                drop(state);
                this.done = true;
                return Poll::Ready(Err(Error::internal("nested scope vanished")));
            };
            if this.body.is_some() {
                if scope.is_cancelled() || scope.first_failure.is_some() {
                    drop(state);
                    // Dropped outside the lock: the body may own nested scopes
                    // of its own.
                    this.body = None;
                    this.close_body(id, false);
                    continue;
                }
                scope.add_waiter(cx.waker());
                return Poll::Pending;
            }
            if !scope.is_drained() {
                scope.add_waiter(cx.waker());
                return Poll::Pending;
            }
            drop(state);
            return Poll::Ready(this.settle(id));
        }
    }
}

impl<T> Drop for NestedScope<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Some(id) = self.id else {
            return;
        };
        drop(self.body.take());
        let mut out = Wakeups::new();
        self.rt.inner().state.lock().orphan_nested(id, &mut out);
        self.rt.inner().release(out);
        trace!(scope = %id, "nested scope orphaned");
    }
}

/// Future returned by `with_timeout`.
#[must_use = "futures do nothing unless polled"]
pub struct WithTimeout<T> {
    nested: NestedScope<T>,
    sleep: Sleep,
    after: Duration,
    expired: bool,
}

impl<T> Unpin for WithTimeout<T> {}

impl<T> fmt::Debug for WithTimeout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WithTimeout")
            .field("nested", &self.nested)
            .field("after", &self.after)
            .field("expired", &self.expired)
            .finish()
    }
}

impl<T> WithTimeout<T> {
    pub(crate) fn new(nested: NestedScope<T>, after: Duration) -> Self {
        Self {
            nested,
            sleep: crate::time::sleep(after),
            after,
            expired: false,
        }
    }
}

impl<T> Future for WithTimeout<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if !this.expired {
            if let Poll::Ready(result) = Pin::new(&mut this.nested).poll(cx) {
                return Poll::Ready(result);
            }
            if Pin::new(&mut this.sleep).poll(cx).is_pending() {
                return Poll::Pending;
            }
            this.expired = true;
            debug!(after = ?this.after, "scope timed out");
            this.nested.cancel(&CancelReason::timeout());
        }
        // The scope has to drain before the timeout is reported.
        match Pin::new(&mut this.nested).poll(cx) {
            Poll::Ready(_) => Poll::Ready(Err(Error::timeout(this.after))),
            Poll::Pending => Poll::Pending,
        }
    }
}
