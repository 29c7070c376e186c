//! Coscope: a structured-concurrency runtime with scoped task trees,
//! cooperative cancellation, pluggable dispatchers and cold flows.
//!
//! # Overview
//!
//! Every task belongs to a scope. A scope finishes only when all of its
//! tasks are terminal, the first failing task cancels its siblings, and
//! cancellation is a request that tasks observe at suspension points and
//! checkpoints, never a silent abort.
//!
//! ```ignore
//! use coscope::{run_blocking, time::sleep};
//! use std::time::Duration;
//!
//! let total = run_blocking(|cx| async move {
//!     let a = cx.spawn(|_cx| async { sleep(Duration::from_millis(50)).await; Ok(1) });
//!     let b = cx.spawn(|_cx| async { sleep(Duration::from_millis(50)).await; Ok(2) });
//!     Ok(a.join().await? + b.join().await?)
//! })?;
//! assert_eq!(total, 3);
//! ```
//!
//! # Core Guarantees
//!
//! - **No orphan tasks**: a scope closes only after all of its children are terminal
//! - **Failure propagation**: the first failure cancels siblings and surfaces to the scope owner
//! - **Cooperative cancellation**: cancellation is observed at `await` points and [`Cx::checkpoint`]
//! - **Explicit placement**: every task runs on a [`Dispatcher`], inherited unless overridden
//!
//! # Module Structure
//!
//! - [`types`]: Identifiers, task states, outcomes and cancellation reasons
//! - [`error`]: Error type and kinds
//! - [`runtime`]: Task registry, dispatchers, worker pools and the blocking bridge
//! - [`cx`]: Task context and scope API
//! - [`time`]: Sleep, timeouts and cooperative yielding
//! - [`flow`]: Cold sequential async streams
//! - [`tracing_compat`]: Logging macros that compile away without `tracing`

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Pedantic lints allowed crate-wide
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod cx;
pub mod error;
pub mod flow;
pub(crate) mod record;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub(crate) mod util;

#[cfg(test)]
pub mod test_utils;

pub use cx::{Cx, NestedScope, Scope, WithTimeout};
pub use error::{Error, ErrorKind, Result};
pub use flow::{flow, flow_of, Emitter, Flow};
pub use runtime::{
    Deferred, Dispatcher, EventLoop, Executor, JobHandle, Runtime, RuntimeBuilder, Start,
    TaskBuilder,
};
pub use types::{CancelKind, CancelReason, Outcome, ScopeId, TaskId, TaskState};

use std::future::Future;

/// Runs `body` as a root task on the process-wide runtime and blocks until
/// its whole task tree is terminal.
///
/// See [`Runtime::run_blocking`].
pub fn run_blocking<T, F, Fut>(body: F) -> Result<T>
where
    T: Send + Sync + 'static,
    F: FnOnce(Cx) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Runtime::global().run_blocking(body)
}

/// The process-wide scope of the global runtime.
///
/// Tasks launched here are unstructured: their failures go to the uncaught
/// handler and nothing waits for them.
#[must_use]
pub fn global_scope() -> Scope {
    Runtime::global().global_scope()
}
