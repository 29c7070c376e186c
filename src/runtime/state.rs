//! Task and scope registry.
//!
//! All structural changes to the task tree go through [`RuntimeState`], held
//! under one lock. Every operation here is lock-held bookkeeping only: wakers
//! to fire and failures to report are collected in [`Wakeups`] and released
//! by the caller after the lock is dropped.
//!
//! Ownership follows the tree: a scope lists the tasks and nested scopes it
//! owns by id, and a task names its owning scope and the body scope its own
//! children live in. No record holds a pointer to another.

use crate::error::Error;
use crate::record::{ScopeKind, ScopeRecord, TaskRecord};
use crate::runtime::dispatcher::Dispatcher;
use crate::runtime::raw_task::{TaskHeader, TaskOutcome};
use crate::types::{CancelReason, Outcome, ScopeId, TaskId};
use crate::util::Arena;
use std::sync::Arc;
use std::task::Waker;

/// Effects produced under the state lock.
#[derive(Debug, Default)]
#[must_use = "wakeups must be released after the state lock is dropped"]
pub(crate) struct Wakeups {
    pub(crate) wakers: Vec<Waker>,
    pub(crate) uncaught: Vec<Error>,
}

impl Wakeups {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.wakers.is_empty() && self.uncaught.is_empty()
    }
}

/// What a finished `with_scope` hands back to its caller.
#[derive(Debug)]
pub(crate) struct ClosedScope {
    pub(crate) first_failure: Option<Error>,
    pub(crate) cancel: Option<CancelReason>,
}

/// Registry of live tasks and scopes.
#[derive(Debug)]
pub(crate) struct RuntimeState {
    pub(crate) tasks: Arena<TaskRecord>,
    pub(crate) scopes: Arena<ScopeRecord>,
    pub(crate) global: ScopeId,
}

impl RuntimeState {
    pub(crate) fn new() -> Self {
        let mut scopes = Arena::new();
        let global = ScopeId::from_arena(scopes.insert_with(|index| {
            ScopeRecord::new(
                ScopeId::from_arena(index),
                ScopeKind::Global,
                Dispatcher::Default,
            )
        }));
        Self {
            tasks: Arena::new(),
            scopes,
            global,
        }
    }

    pub(crate) fn scope(&self, id: ScopeId) -> Option<&ScopeRecord> {
        self.scopes.get(id.arena_index())
    }

    pub(crate) fn scope_mut(&mut self, id: ScopeId) -> Option<&mut ScopeRecord> {
        self.scopes.get_mut(id.arena_index())
    }

    pub(crate) fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id.arena_index())
    }

    /// Inserts a scope. Nested scopes are linked into their parent, which
    /// must exist.
    pub(crate) fn create_scope(&mut self, kind: ScopeKind, dispatcher: Dispatcher) -> ScopeId {
        let id = ScopeId::from_arena(
            self.scopes
                .insert_with(|index| ScopeRecord::new(ScopeId::from_arena(index), kind, dispatcher)),
        );
        if let ScopeKind::Nested { parent } = kind {
            if let Some(parent) = self.scope_mut(parent) {
                parent.nested.push(id);
            }
        }
        id
    }

    /// Opens a scope nested in `parent`, inheriting its dispatcher and its
    /// cancellation. Returns `None` if `parent` is gone.
    pub(crate) fn open_nested(&mut self, parent: ScopeId) -> Option<ScopeId> {
        let record = self.scope(parent)?;
        let dispatcher = record.dispatcher.clone();
        let inherited_cancel = record.is_cancelled();
        let id = self.create_scope(ScopeKind::Nested { parent }, dispatcher);
        if inherited_cancel {
            if let Some(scope) = self.scope_mut(id) {
                scope.record_cancel(&CancelReason::parent_cancelled());
            }
        }
        Some(id)
    }

    /// Cancels `id`, every task it owns and, recursively, their scopes.
    pub(crate) fn cancel_scope(&mut self, id: ScopeId, reason: &CancelReason, out: &mut Wakeups) {
        let Some(scope) = self.scope_mut(id) else {
            return;
        };
        if !scope.record_cancel(reason) {
            return;
        }
        out.wakers.append(&mut scope.waiters);
        let tasks = scope.tasks.clone();
        let nested = scope.nested.clone();
        for task in tasks {
            self.cancel_task(task, reason, out);
        }
        let inherited = CancelReason::parent_cancelled();
        for child in nested {
            self.cancel_scope(child, &inherited, out);
        }
    }

    /// Requests cancellation of a live task and of everything it launched.
    pub(crate) fn cancel_task(&mut self, id: TaskId, reason: &CancelReason, out: &mut Wakeups) {
        let Some(task) = self.task(id) else {
            return;
        };
        if !task.request_cancel(reason) {
            return;
        }
        out.wakers.push(task.waker.clone());
        let body_scope = task.body_scope;
        self.cancel_scope(body_scope, &CancelReason::parent_cancelled(), out);
    }

    /// Called once a task's body has returned: marks its body scope as
    /// closing and cancels the children if the body failed or was cancelled.
    pub(crate) fn close_body_scope(&mut self, body: ScopeId, outcome: &TaskOutcome, out: &mut Wakeups) {
        let Some(scope) = self.scope_mut(body) else {
            return;
        };
        scope.closing = true;
        match outcome {
            Outcome::Ok(()) => {}
            Outcome::Err(_) | Outcome::Panicked(_) => {
                self.cancel_scope(body, &CancelReason::sibling_failed(), out);
            }
            Outcome::Cancelled(_) => {
                self.cancel_scope(body, &CancelReason::parent_cancelled(), out);
            }
        }
        self.apply_lazy_rule(body, out);
    }

    /// Cancels lazy tasks that nobody started once they are all that keeps a
    /// closing scope open.
    pub(crate) fn apply_lazy_rule(&mut self, id: ScopeId, out: &mut Wakeups) {
        let Some(scope) = self.scope(id) else {
            return;
        };
        if !scope.closing || !scope.nested.is_empty() || scope.tasks.is_empty() {
            return;
        }
        let all_unstarted = scope.tasks.iter().all(|task| {
            self.task(*task)
                .is_some_and(TaskRecord::is_unstarted_lazy)
        });
        if !all_unstarted {
            return;
        }
        let tasks = scope.tasks.clone();
        let reason = CancelReason::parent_cancelled();
        for task in tasks {
            self.cancel_task(task, &reason, out);
        }
    }

    /// Retires a task whose body returned and whose body scope drained.
    ///
    /// Returns `None` if the body scope picked up new children since the
    /// caller last saw it drained; the caller must wait again. Otherwise
    /// returns the final outcome, which the caller stores in the header.
    pub(crate) fn finish_task(
        &mut self,
        id: TaskId,
        body_outcome: TaskOutcome,
        out: &mut Wakeups,
    ) -> Option<TaskOutcome> {
        let Some(record) = self.task(id) else {
            return Some(body_outcome);
        };
        let body_scope = record.body_scope;
        if !self.scope(body_scope).map_or(true, ScopeRecord::is_drained) {
            return None;
        }
        let first_failure = self
            .scopes
            .remove(body_scope.arena_index())
            .and_then(|scope| scope.first_failure);
        let task = self.tasks.remove(id.arena_index())?;

        let outcome = match body_outcome {
            failed @ (Outcome::Err(_) | Outcome::Panicked(_)) => failed,
            other => match first_failure {
                Some(error) => Outcome::Err(error),
                None if other.is_ok() && task.header.is_cancel_requested() => {
                    Outcome::Cancelled(task.header.cancel_reason().unwrap_or_default())
                }
                None => other,
            },
        };

        let failure = match &outcome {
            Outcome::Err(error) => Some(error.clone()),
            Outcome::Panicked(payload) => Some(Error::panicked(payload)),
            Outcome::Ok(()) | Outcome::Cancelled(_) => None,
        }
        .map(|error| error.attach_origin(id, task.owner));

        if let Some(owner) = self.scope_mut(task.owner) {
            owner.remove_task(id);
            if let Some(error) = failure {
                self.report_failure(task.owner, error, out);
            }
            self.after_scope_shrank(task.owner, out);
        }

        Some(outcome)
    }

    fn report_failure(&mut self, id: ScopeId, error: Error, out: &mut Wakeups) {
        let Some(scope) = self.scope_mut(id) else {
            return;
        };
        let kind = scope.kind;
        match kind {
            ScopeKind::Global => out.uncaught.push(error),
            ScopeKind::Root => {
                scope.record_failure(&error);
            }
            ScopeKind::Nested { .. } => {
                if scope.record_failure(&error) {
                    out.wakers.append(&mut scope.waiters);
                    self.cancel_scope(id, &CancelReason::sibling_failed(), out);
                }
            }
            ScopeKind::Body { task } => {
                if scope.record_failure(&error) {
                    self.cancel_scope(id, &CancelReason::sibling_failed(), out);
                    self.cancel_task(task, &CancelReason::sibling_failed(), out);
                }
            }
        }
    }

    /// Wakes whoever waits on `id` after it lost a child, and releases
    /// orphaned nested scopes that just drained.
    fn after_scope_shrank(&mut self, id: ScopeId, out: &mut Wakeups) {
        let Some(scope) = self.scope_mut(id) else {
            return;
        };
        out.wakers.append(&mut scope.waiters);
        let kind = scope.kind;
        if scope.orphaned && scope.is_drained() {
            if let ScopeKind::Nested { parent } = kind {
                self.scopes.remove(id.arena_index());
                if let Some(parent_scope) = self.scope_mut(parent) {
                    parent_scope.remove_nested(id);
                }
                self.after_scope_shrank(parent, out);
                return;
            }
        }
        self.apply_lazy_rule(id, out);
    }

    /// Removes a drained nested scope whose opener is done with it.
    pub(crate) fn close_nested(&mut self, id: ScopeId, out: &mut Wakeups) -> Option<ClosedScope> {
        let scope = self.scopes.remove(id.arena_index())?;
        if let ScopeKind::Nested { parent } = scope.kind {
            if let Some(parent_scope) = self.scope_mut(parent) {
                parent_scope.remove_nested(id);
            }
            self.after_scope_shrank(parent, out);
        }
        Some(ClosedScope {
            first_failure: scope.first_failure,
            cancel: scope.cancel,
        })
    }

    /// Detaches a nested scope whose opener was dropped before it finished.
    ///
    /// The scope is cancelled and removed as soon as it drains.
    pub(crate) fn orphan_nested(&mut self, id: ScopeId, out: &mut Wakeups) {
        self.cancel_scope(id, &CancelReason::parent_cancelled(), out);
        let Some(scope) = self.scope_mut(id) else {
            return;
        };
        scope.orphaned = true;
        scope.closing = true;
        let drained = scope.is_drained();
        if drained {
            let _ = self.close_nested(id, out);
        }
    }

    /// Headers of every task owned by the global scope.
    pub(crate) fn global_tasks(&self) -> Vec<Arc<TaskHeader>> {
        self.scope(self.global)
            .map(|scope| {
                scope
                    .tasks
                    .iter()
                    .filter_map(|task| self.task(*task).map(|record| Arc::clone(&record.header)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
