//! Emission side of a flow.
//!
//! The producer and its collector share a [`Handoff`]: a single value slot
//! plus the identity of the thread currently polling the producer. A value
//! is only accepted while the collector is inside that poll, which keeps
//! emission sequential and unbuffered.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::context::current_task;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};

pub(crate) struct Handoff<T> {
    slot: Mutex<Option<T>>,
    driver: Mutex<Option<ThreadId>>,
}

impl<T> Handoff<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    /// Marks the calling thread as polling the producer until the guard
    /// drops.
    pub(crate) fn drive(&self) -> DriveGuard<'_, T> {
        *self.driver.lock() = Some(thread::current().id());
        DriveGuard { handoff: self }
    }

    fn is_driven_here(&self) -> bool {
        *self.driver.lock() == Some(thread::current().id())
    }

    /// Takes the value offered during the last producer poll.
    pub(crate) fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    fn offer(&self, value: T) -> std::result::Result<(), T> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(value);
        }
        *slot = Some(value);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

pub(crate) struct DriveGuard<'a, T> {
    handoff: &'a Handoff<T>,
}

impl<T> Drop for DriveGuard<'_, T> {
    fn drop(&mut self) {
        *self.handoff.driver.lock() = None;
    }
}

/// Sends values from a flow's producer to its collector.
///
/// Each `collect` hands its producer a fresh emitter. Values must be emitted
/// from the producer's own future: an emitter moved into another task fails
/// with `FlowInvariant`.
pub struct Emitter<T> {
    handoff: Arc<Handoff<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            handoff: Arc::clone(&self.handoff),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("pending", &!self.handoff.is_empty())
            .finish()
    }
}

impl<T> Emitter<T> {
    pub(crate) fn new(handoff: Arc<Handoff<T>>) -> Self {
        Self { handoff }
    }

    /// Hands `value` to the collector and waits until it was processed.
    ///
    /// # Errors
    ///
    /// - `FlowInvariant` if called outside the collecting poll, or while
    ///   another emission is still pending.
    /// - `Cancelled` if the collecting task was cancelled.
    pub fn emit(&self, value: T) -> Emit<'_, T> {
        Emit {
            handoff: &self.handoff,
            value: Some(value),
        }
    }
}

/// Future returned by [`Emitter::emit`].
#[must_use = "values are only emitted when the future is awaited"]
pub struct Emit<'a, T> {
    handoff: &'a Handoff<T>,
    value: Option<T>,
}

impl<T> Unpin for Emit<'_, T> {}

impl<T> fmt::Debug for Emit<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emit")
            .field("offered", &self.value.is_none())
            .finish()
    }
}

impl<T> Future for Emit<'_, T> {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        let Some(value) = self.value.take() else {
            // The collector only re-polls the producer once the value it
            // took has been fully consumed.
            return if self.handoff.is_empty() {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            };
        };
        if !self.handoff.is_driven_here() {
            return Poll::Ready(Err(Error::new(ErrorKind::FlowInvariant)
                .with_message("emit called outside the collector's poll")));
        }
        if let Some(reason) = current_task().and_then(|task| task.cancel_reason()) {
            return Poll::Ready(Err(Error::cancelled(&reason)));
        }
        if self.handoff.offer(value).is_err() {
            return Poll::Ready(Err(Error::new(ErrorKind::FlowInvariant)
                .with_message("concurrent emit on one flow")));
        }
        Poll::Pending
    }
}
