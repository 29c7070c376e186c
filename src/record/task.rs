//! Task record for the runtime.
//!
//! The record is the registry's view of a live task: which scope owns it,
//! which scope owns its children, and how to wake it. The handle-visible
//! state lives in the shared [`TaskHeader`].

use crate::runtime::raw_task::TaskHeader;
use crate::types::{CancelReason, ScopeId, TaskId};
use std::sync::Arc;
use std::task::Waker;

/// Internal record for a task in the runtime.
#[derive(Debug)]
pub struct TaskRecord {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// The scope that owns this task.
    pub owner: ScopeId,
    /// The scope that owns the tasks this task launches.
    pub body_scope: ScopeId,
    /// Shared header, also held by handles.
    pub header: Arc<TaskHeader>,
    /// Schedules a poll of the task.
    pub waker: Waker,
}

impl TaskRecord {
    /// Creates a new task record.
    #[must_use]
    pub fn new(header: Arc<TaskHeader>, owner: ScopeId, body_scope: ScopeId, waker: Waker) -> Self {
        Self {
            id: header.id(),
            owner,
            body_scope,
            header,
            waker,
        }
    }

    /// Requests cancellation of this task.
    ///
    /// Returns true if the request was new (not already pending).
    pub fn request_cancel(&self, reason: &CancelReason) -> bool {
        self.header.request_cancel(reason)
    }

    /// True for a lazy task nobody has started yet.
    #[must_use]
    pub fn is_unstarted_lazy(&self) -> bool {
        self.header.is_lazy() && !self.header.is_started()
    }
}
