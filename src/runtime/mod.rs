//! Runtime: executors, the task registry and the blocking bridge.
//!
//! # Overview
//!
//! A [`Runtime`] owns two worker pools (behind [`Dispatcher::Default`] and
//! [`Dispatcher::Io`]), an optional host executor behind
//! [`Dispatcher::Main`], and the registry of live tasks and scopes.
//!
//! - [`Runtime::run_blocking`] enters a new task tree from synchronous code.
//! - [`Runtime::global_scope`] launches unsupervised work.
//! - [`EventLoop`] turns any thread into an executor, e.g. a UI main loop.
//!
//! Tasks are futures wrapped in a driver that handles cancellation, panics
//! and waiting for children; every wake-up re-submits the task to the
//! executor its dispatcher resolved to.

mod block_on;
pub mod builder;
pub mod config;
pub(crate) mod context;
pub mod dispatcher;
pub mod env_config;
pub mod event_loop;
pub(crate) mod raw_task;
pub mod spawn;
pub(crate) mod state;
pub mod stats;
pub mod task_handle;
pub mod worker_pool;

pub use builder::{BuildError, Runtime, RuntimeBuilder};
pub use config::{RuntimeConfig, UncaughtHandler};
pub use dispatcher::{Dispatcher, Executor, Job};
pub use event_loop::EventLoop;
pub use spawn::{Start, TaskBuilder};
pub use stats::RuntimeStats;
pub use task_handle::{Deferred, JobHandle};
pub use worker_pool::{WorkerPool, WorkerPoolOptions};
