//! The capability context handed to every task body.
//!
//! A [`Cx`] identifies the running task and the scope its children are
//! launched into. It is the only way for a body to launch structured
//! children, open nested scopes, or query its own cancellation.
//!
//! # Cancellation
//!
//! Cancellation is cooperative. The runtime checks the cancel flag every
//! time the task is woken, so a task blocked in `sleep` or `join` stops at
//! its next wake-up. Long computations that never suspend should call
//! [`Cx::checkpoint`] or [`Cx::is_active`] periodically.
//!
//! ```ignore
//! rt.run_blocking(|cx| async move {
//!     for chunk in input.chunks(1024) {
//!         cx.checkpoint()?;
//!         process(chunk);
//!     }
//!     Ok(())
//! })?;
//! ```
//!
//! # Cloning
//!
//! `Cx` is cheap to clone. Clones moved into a child closure still refer to
//! the parent task, so prefer the `Cx` a child receives as its argument.

use crate::cx::scope::{NestedScope, Scope, WithTimeout};
use crate::error::{Error, Result};
use crate::runtime::builder::Runtime;
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::raw_task::TaskHeader;
use crate::runtime::spawn::TaskBuilder;
use crate::runtime::task_handle::{Deferred, JobHandle};
use crate::types::{CancelReason, ScopeId, TaskId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Context of the running task.
#[derive(Clone)]
pub struct Cx {
    rt: Runtime,
    header: Arc<TaskHeader>,
    scope: ScopeId,
    dispatcher: Dispatcher,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("task", &self.header.id())
            .field("scope", &self.scope)
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}

impl Cx {
    pub(crate) fn new(
        rt: Runtime,
        header: Arc<TaskHeader>,
        scope: ScopeId,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            rt,
            header,
            scope,
            dispatcher,
        }
    }

    /// ID of the running task.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.header.id()
    }

    /// Name of the running task, if it was given one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.header.name()
    }

    /// The dispatcher this task runs on and its children inherit.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The runtime the task belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// True until cancellation of this task was requested.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.header.is_cancel_requested()
    }

    /// True once cancellation of this task was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.header.is_cancel_requested()
    }

    /// Why the task was asked to stop, if it was.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.header.cancel_reason()
    }

    /// Returns an error of kind `Cancelled` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// `ErrorKind::Cancelled` carrying the cancel reason.
    pub fn checkpoint(&self) -> Result<()> {
        match self.header.cancel_reason() {
            Some(reason) => Err(Error::cancelled(&reason)),
            None => Ok(()),
        }
    }

    /// The scope this task's children are launched into.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::with_owner(self.rt.clone(), self.scope, Arc::clone(&self.header))
    }

    /// Starts configuring a child task.
    pub fn task(&self) -> TaskBuilder {
        TaskBuilder::new(self.rt.clone(), self.scope)
    }

    /// Launches a child task and returns immediately.
    pub fn launch<F, Fut>(&self, body: F) -> JobHandle
    where
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.task().launch(body)
    }

    /// Launches a child task that produces a value.
    pub fn spawn<T, F, Fut>(&self, body: F) -> Deferred<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.task().spawn(body)
    }

    /// Runs `body` in a nested scope and waits for it and everything it
    /// launched.
    ///
    /// The calling task is suspended, not blocked, while the scope runs. The
    /// first child failure cancels the rest of the scope and is returned.
    pub fn with_scope<T, F, Fut>(&self, body: F) -> NestedScope<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        NestedScope::open(
            self.rt.clone(),
            self.scope,
            Some(Arc::clone(&self.header)),
            body,
        )
    }

    /// Like [`with_scope`](Self::with_scope), but cancels the scope once
    /// `after` elapsed and then returns an error of kind `Timeout`.
    pub fn with_timeout<T, F, Fut>(&self, after: Duration, body: F) -> WithTimeout<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        WithTimeout::new(self.with_scope(body), after)
    }

    /// Runs `body` on `dispatcher` and waits for its value.
    ///
    /// The body runs as the only child of a nested scope, so its failure is
    /// returned here rather than failing the calling task.
    ///
    /// ```ignore
    /// let bytes = cx.with_dispatcher(Dispatcher::Io, |_cx| async move {
    ///     Ok(std::fs::read(path)?)
    /// }).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// The body's failure, or `Cancelled` if the caller was cancelled.
    pub async fn with_dispatcher<T, F, Fut>(&self, dispatcher: Dispatcher, body: F) -> Result<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.with_scope(move |cx| async move {
            cx.task().dispatcher(dispatcher).spawn(body).into_value().await
        })
        .await
    }
}
