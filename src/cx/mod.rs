//! Task context and scope API.
//!
//! The [`Cx`] type is handed to every task body. It identifies the task and
//! is the entry point for launching structured children.
//! The [`Scope`] type is a handle for launching into a specific scope,
//! including the unsupervised global one.
//!
//! # Module Contents
//!
//! - [`Cx`]: the running task's context
//! - [`Scope`]: launching into a scope, nested scopes and timeouts
//! - [`NestedScope`], [`WithTimeout`]: the futures behind `with_scope` and
//!   `with_timeout`

#[allow(clippy::module_inception)]
pub mod cx;
pub mod scope;

pub use cx::Cx;
pub use scope::{NestedScope, Scope, WithTimeout};
