//! Sleep future for delaying execution.
//!
//! The [`Sleep`] future completes after a deadline has passed. It registers
//! with the process timer thread on its first pending poll.
//!
//! A duration too large to add to the current instant means no deadline: the
//! sleep never completes and never registers a timer.

use crate::time::deadline_after;
use crate::time::driver::{TimerDriver, TimerHandle};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// A future that completes after a specified deadline.
///
/// # Cancel Safety
///
/// `Sleep` is cancel-safe. Dropping it removes its timer registration.
///
/// Inside a task, a sleep is also a cancellation point: cancelling the task
/// wakes it and the task stops before the sleep resolves.
///
/// # Example
///
/// ```ignore
/// use coscope::time::sleep;
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(100)).await;
/// ```
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    deadline: Option<Instant>,
    timer: Option<TimerHandle>,
}

impl Sleep {
    /// Creates a `Sleep` that completes at `deadline`.
    pub fn new(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            timer: None,
        }
    }

    /// Creates a `Sleep` that never completes.
    pub fn forever() -> Self {
        Self {
            deadline: None,
            timer: None,
        }
    }

    /// Returns the deadline for this sleep, `None` if it never completes.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the deadline has passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Moves the deadline, dropping any existing registration.
    pub fn reset(&mut self, deadline: Instant) {
        self.unregister();
        self.deadline = Some(deadline);
    }

    fn unregister(&mut self) {
        if let Some(handle) = self.timer.take() {
            TimerDriver::global().cancel(&handle);
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(deadline) = self.deadline else {
            return Poll::Pending;
        };
        if Instant::now() >= deadline {
            self.unregister();
            return Poll::Ready(());
        }
        let driver = TimerDriver::global();
        let live = self
            .timer
            .as_ref()
            .is_some_and(|handle| driver.update(handle, cx.waker()));
        if !live {
            self.timer = Some(driver.register(deadline, cx.waker().clone()));
        }
        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Sleeps for `duration`.
///
/// `Duration::MAX` sleeps forever; inside a task only cancellation ends it.
pub fn sleep(duration: Duration) -> Sleep {
    deadline_after(duration).map_or_else(Sleep::forever, sleep_until)
}

/// Sleeps until `deadline`.
pub fn sleep_until(deadline: Instant) -> Sleep {
    Sleep::new(deadline)
}
