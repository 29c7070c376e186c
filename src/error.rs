//! Error types for coscope.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors compose with the [`Outcome`](crate::types::Outcome) severity lattice
//! - Panics are isolated and converted to `Outcome::Panicked`
//! - Cancellation is an expected outcome, not a failure
//!
//! # Error Categories
//!
//! - **Cancellation**: the task observed a cancellation request or a timeout
//! - **Task**: a task body failed or panicked
//! - **Dispatch**: the requested execution context is not available
//! - **Flow**: a flow was used outside its collection contract
//! - **Internal**: runtime bugs and invalid states

use core::fmt;
use std::sync::Arc;

use crate::types::{CancelReason, PanicPayload, ScopeId, TaskId};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Cancellation ===
    /// The operation was cancelled.
    Cancelled,
    /// A timeout elapsed before the operation completed.
    Timeout,

    // === Task failures ===
    /// The task body panicked.
    Panicked,
    /// Application-provided failure.
    User,

    // === Dispatch ===
    /// A task targeted the main dispatcher but the host installed no main
    /// executor.
    MainDispatcherUnavailable,
    /// The owning scope was already closed when the task was launched.
    ScopeClosed,

    // === Flow ===
    /// `emit` was called outside the collection that owns the emitter.
    FlowInvariant,

    // === Internal ===
    /// Internal runtime error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled | Self::Timeout => ErrorCategory::Cancellation,
            Self::Panicked | Self::User => ErrorCategory::Task,
            Self::MainDispatcherUnavailable | Self::ScopeClosed => ErrorCategory::Dispatch,
            Self::FlowInvariant => ErrorCategory::Flow,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Cancellation and timeouts.
    Cancellation,
    /// Task body failures.
    Task,
    /// Execution context failures.
    Dispatch,
    /// Flow contract violations.
    Flow,
    /// Internal runtime errors.
    Internal,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The task where the error originated.
    pub task_id: Option<TaskId>,
    /// The scope owning the task.
    pub scope_id: Option<ScopeId>,
}

/// The main error type for coscope operations.
///
/// Cheap to clone: the source is shared, so a failure stored in a task's
/// result slot can be handed to every joiner.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                task_id: None,
                scope_id: None,
            },
        }
    }

    /// Creates an application failure with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Wraps an arbitrary error as an application failure.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let message = source.to_string();
        Self::new(ErrorKind::User)
            .with_message(message)
            .with_source(source)
    }

    /// Creates a cancellation error from a structured reason.
    #[must_use]
    pub fn cancelled(reason: &CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{reason}"))
    }

    /// Creates a panic error from a caught payload.
    #[must_use]
    pub fn panicked(payload: &PanicPayload) -> Self {
        Self::new(ErrorKind::Panicked).with_message(payload.message())
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(ErrorKind::Timeout).with_message(format!("timed out after {after:?}"))
    }

    /// Creates an internal error (runtime bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds structured context to the error.
    #[must_use]
    pub const fn with_context(mut self, ctx: ErrorContext) -> Self {
        self.context = ctx;
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the error context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Fills in the originating task and scope if not already set.
    pub(crate) fn attach_origin(mut self, task_id: TaskId, scope_id: ScopeId) -> Self {
        self.context.task_id.get_or_insert(task_id);
        self.context.scope_id.get_or_insert(scope_id);
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        Self::cancelled(&reason)
    }
}

/// A specialized Result type for coscope operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_message() {
        let err = Error::user("disk on fire");
        assert_eq!(err.to_string(), "User: disk on fire");
    }

    #[test]
    fn from_source_keeps_chain() {
        let err = Error::from_source(Underlying);
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.message(), Some("underlying"));
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn cancel_reason_converts() {
        let err: Error = CancelReason::user("stop").into();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Cancelled: user: stop");
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorKind::Timeout.category(), ErrorCategory::Cancellation);
        assert_eq!(
            ErrorKind::MainDispatcherUnavailable.category(),
            ErrorCategory::Dispatch
        );
        assert_eq!(ErrorKind::FlowInvariant.category(), ErrorCategory::Flow);
        assert!(Error::timeout(std::time::Duration::from_millis(5)).is_timeout());
    }

    #[test]
    fn attach_origin_does_not_overwrite() {
        let first = TaskId::new_for_test(1, 0);
        let scope = ScopeId::new_for_test(2, 0);
        let err = Error::user("x")
            .attach_origin(first, scope)
            .attach_origin(TaskId::new_for_test(9, 0), scope);
        assert_eq!(err.context().task_id, Some(first));
        assert_eq!(err.context().scope_id, Some(scope));
    }
}
