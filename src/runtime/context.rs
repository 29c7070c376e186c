//! The task currently being polled on this thread.
//!
//! Set by the raw task around each poll so that code without a [`Cx`]
//! at hand (flow emission, `yield_now`) can still observe cancellation.
//!
//! [`Cx`]: crate::cx::Cx

use crate::runtime::raw_task::TaskHeader;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CURRENT_TASK: RefCell<Option<Arc<TaskHeader>>> = const { RefCell::new(None) };
}

/// Restores the previously current task on drop.
pub(crate) struct CurrentTaskGuard {
    prev: Option<Arc<TaskHeader>>,
}

impl CurrentTaskGuard {
    pub(crate) fn enter(header: Arc<TaskHeader>) -> Self {
        let prev = CURRENT_TASK.with(|slot| slot.borrow_mut().replace(header));
        Self { prev }
    }
}

impl Drop for CurrentTaskGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_TASK.with(|slot| {
            *slot.borrow_mut() = prev;
        });
    }
}

/// Header of the task being polled on this thread, if any.
pub(crate) fn current_task() -> Option<Arc<TaskHeader>> {
    CURRENT_TASK.with(|slot| slot.borrow().clone())
}

/// True if the task polled on this thread has a pending cancel request.
pub(crate) fn current_cancel_requested() -> bool {
    CURRENT_TASK.with(|slot| {
        slot.borrow()
            .as_ref()
            .is_some_and(|header| header.is_cancel_requested())
    })
}
