//! Blocking bridge from synchronous code into a task tree.
//!
//! [`Runtime::run_blocking`] occupies the calling thread until the root task
//! and every task in its structured tree are terminal. While it waits, the
//! thread drives an [`EventLoop`] that is the root's inherited dispatcher,
//! so children launched without an explicit dispatcher run on the caller's
//! thread. Work bound to other dispatchers runs on their own threads.
//!
//! Contrast with `with_scope`, which suspends the calling task and frees its
//! worker thread while the nested scope runs.

use crate::cx::Cx;
use crate::error::{Error, Result};
use crate::record::ScopeKind;
use crate::runtime::builder::Runtime;
use crate::runtime::dispatcher::{Dispatcher, Executor};
use crate::runtime::event_loop::EventLoop;
use crate::runtime::raw_task::TaskHeader;
use crate::runtime::spawn::{Spawned, TaskOptions};
use crate::tracing_compat::trace;
use crate::types::ScopeId;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::task::{Wake, Waker};

struct LoopWaker(Arc<EventLoop>);

impl Wake for LoopWaker {
    fn wake(self: Arc<Self>) {
        self.0.wake();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.wake();
    }
}

impl Runtime {
    /// Runs `body` as the root of a new task tree and blocks the calling
    /// thread until the whole tree is terminal.
    ///
    /// Returns the body's value, or the first failure anywhere in the tree.
    ///
    /// # Errors
    ///
    /// The body's error, the first failure of a structured child, or an
    /// error of kind `Cancelled` if the root was cancelled.
    pub fn run_blocking<T, F, Fut>(&self, body: F) -> Result<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let event_loop = Arc::new(EventLoop::with_fallback(
            "run-blocking",
            self.inner().default_executor(),
        ));
        let dispatcher = Dispatcher::Custom(Arc::clone(&event_loop) as Arc<dyn Executor>);
        let (root, spawned) = self.launch_root(dispatcher, body);

        let waker = Waker::from(Arc::new(LoopWaker(Arc::clone(&event_loop))));
        let _ = spawned.header.poll_terminal(&waker);
        event_loop.run_until(|| spawned.header.is_terminal());
        event_loop.close();

        self.finish_root(root, spawned)
    }

    /// Like [`run_blocking`](Self::run_blocking), but runs the root on
    /// `dispatcher`; the calling thread only waits.
    ///
    /// # Errors
    ///
    /// As for [`run_blocking`](Self::run_blocking).
    pub fn run_blocking_on<T, F, Fut>(&self, dispatcher: Dispatcher, body: F) -> Result<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (root, spawned) = self.launch_root(dispatcher, body);
        spawned.header.wait_blocking(None);
        self.finish_root(root, spawned)
    }

    fn launch_root<T, F, Fut>(&self, dispatcher: Dispatcher, body: F) -> (ScopeId, Spawned<T>)
    where
        T: Send + Sync + 'static,
        F: FnOnce(Cx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let inner = self.inner();
        let root = inner
            .state
            .lock()
            .create_scope(ScopeKind::Root, dispatcher.clone());
        let options = TaskOptions {
            name: Some(Arc::from("run_blocking")),
            dispatcher: Some(dispatcher),
            ..TaskOptions::default()
        };
        let spawned = inner.launch(root, options, body);
        trace!(root = %root, task = %spawned.header.id(), "blocking bridge entered");
        (root, spawned)
    }

    fn finish_root<T>(&self, root: ScopeId, spawned: Spawned<T>) -> Result<T> {
        self.inner().state.lock().scopes.remove(root.arena_index());
        let Spawned { header, raw, slot } = spawned;
        drop(raw);
        settle(&header, slot)
    }
}

fn settle<T>(header: &TaskHeader, slot: Arc<OnceLock<T>>) -> Result<T> {
    match header.outcome() {
        Some(outcome) => outcome.clone().into_result()?,
        None => return Err(Error::internal("blocking bridge returned before the root settled")),
    }
    Arc::try_unwrap(slot)
        .ok()
        .and_then(OnceLock::into_inner)
        .ok_or_else(|| Error::internal("root value missing"))
}
