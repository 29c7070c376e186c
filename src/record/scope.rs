//! Scope record for the runtime.
//!
//! A scope owns the tasks launched into it and the nested scopes opened
//! inside it. It is removed from the registry only once both sets are empty.

use crate::error::Error;
use crate::runtime::dispatcher::Dispatcher;
use crate::types::{CancelReason, ScopeId, TaskId};
use smallvec::SmallVec;
use std::task::Waker;

/// What a scope is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Root of a `run_blocking` tree.
    Root,
    /// The process-wide unsupervised scope.
    Global,
    /// Children of a task's body.
    Body {
        /// Task whose body launches into this scope.
        task: TaskId,
    },
    /// Opened by `with_scope` inside another scope.
    Nested {
        /// Enclosing scope.
        parent: ScopeId,
    },
}

/// Internal record for a scope in the runtime.
#[derive(Debug)]
pub struct ScopeRecord {
    /// Unique identifier for this scope.
    pub id: ScopeId,
    /// What the scope is attached to.
    pub kind: ScopeKind,
    /// Dispatcher inherited by tasks launched without an explicit one.
    pub dispatcher: Dispatcher,
    /// Live tasks owned by this scope.
    pub tasks: SmallVec<[TaskId; 4]>,
    /// Live nested scopes.
    pub nested: SmallVec<[ScopeId; 2]>,
    /// Set once the scope was cancelled.
    pub cancel: Option<CancelReason>,
    /// First failure reported by an owned task.
    pub first_failure: Option<Error>,
    /// The code that opened the scope has finished; only children remain.
    pub closing: bool,
    /// The opener went away; the runtime removes the scope once drained.
    pub orphaned: bool,
    /// Futures waiting for the scope to drain, fail or be cancelled.
    pub waiters: Vec<Waker>,
}

impl ScopeRecord {
    /// Creates an open, empty scope.
    #[must_use]
    pub fn new(id: ScopeId, kind: ScopeKind, dispatcher: Dispatcher) -> Self {
        Self {
            id,
            kind,
            dispatcher,
            tasks: SmallVec::new(),
            nested: SmallVec::new(),
            cancel: None,
            first_failure: None,
            closing: false,
            orphaned: false,
            waiters: Vec::new(),
        }
    }

    /// True when no task or nested scope is left.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.tasks.is_empty() && self.nested.is_empty()
    }

    /// True once cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancel.is_some()
    }

    /// Records `reason`, keeping the most severe one.
    ///
    /// Returns true if the scope was not cancelled before.
    pub fn record_cancel(&mut self, reason: &CancelReason) -> bool {
        match self.cancel.as_mut() {
            Some(existing) => {
                existing.strengthen(reason);
                false
            }
            None => {
                self.cancel = Some(reason.clone());
                true
            }
        }
    }

    /// Records `error` unless an earlier failure is already stored.
    ///
    /// Returns true if this is the first failure.
    pub fn record_failure(&mut self, error: &Error) -> bool {
        if self.first_failure.is_some() {
            return false;
        }
        self.first_failure = Some(error.clone());
        true
    }

    /// Registers a waiter, skipping duplicates.
    pub fn add_waiter(&mut self, waker: &Waker) {
        if !self.waiters.iter().any(|w| w.will_wake(waker)) {
            self.waiters.push(waker.clone());
        }
    }

    /// Removes `task` from the owned set.
    pub fn remove_task(&mut self, task: TaskId) {
        self.tasks.retain(|t| *t != task);
    }

    /// Removes `scope` from the nested set.
    pub fn remove_nested(&mut self, scope: ScopeId) {
        self.nested.retain(|s| *s != scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    fn scope() -> ScopeRecord {
        ScopeRecord::new(ScopeId::new_for_test(0, 0), ScopeKind::Root, Dispatcher::Default)
    }

    #[test]
    fn first_failure_wins() {
        let mut scope = scope();
        assert!(scope.record_failure(&Error::user("first")));
        assert!(!scope.record_failure(&Error::user("second")));
        assert_eq!(
            scope.first_failure.as_ref().and_then(Error::message),
            Some("first")
        );
    }

    #[test]
    fn cancel_keeps_strongest_reason() {
        let mut scope = scope();
        assert!(scope.record_cancel(&CancelReason::user("stop")));
        assert!(!scope.record_cancel(&CancelReason::shutdown()));
        assert!(scope.is_cancelled());
        assert_eq!(
            scope.cancel.as_ref().map(CancelReason::kind),
            Some(CancelKind::Shutdown)
        );
    }

    #[test]
    fn drained_tracks_tasks_and_nested() {
        let mut scope = scope();
        assert!(scope.is_drained());
        scope.tasks.push(TaskId::new_for_test(1, 0));
        scope.nested.push(ScopeId::new_for_test(2, 0));
        assert!(!scope.is_drained());
        scope.remove_task(TaskId::new_for_test(1, 0));
        assert!(!scope.is_drained());
        scope.remove_nested(ScopeId::new_for_test(2, 0));
        assert!(scope.is_drained());
    }
}
