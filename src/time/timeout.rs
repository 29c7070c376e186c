//! Deadline for an arbitrary future.
//!
//! [`timeout`] races a future against a [`Sleep`]. The loser is dropped: on
//! expiry the inner future never completes. Use `Cx::with_timeout` instead
//! when the work launches children that must be cancelled and drained.

use crate::error::{Error, Result};
use crate::time::sleep::{sleep, sleep_until, Sleep};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Future returned by [`timeout`] and [`timeout_at`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Timeout<F> {
    future: Pin<Box<F>>,
    sleep: Sleep,
    after: Duration,
}

impl<F: Future> Future for Timeout<F> {
    type Output = Result<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Poll::Ready(value) = this.future.as_mut().poll(cx) {
            return Poll::Ready(Ok(value));
        }
        match Pin::new(&mut this.sleep).poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(Error::timeout(this.after))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Requires `future` to complete within `after`.
///
/// # Errors
///
/// Resolves to an error of kind `Timeout` if the deadline passes first.
///
/// ```ignore
/// match timeout(Duration::from_secs(1), fetch()).await {
///     Ok(value) => use_it(value),
///     Err(err) if err.is_timeout() => retry(),
///     Err(err) => return Err(err),
/// }
/// ```
pub fn timeout<F: Future>(after: Duration, future: F) -> Timeout<F> {
    Timeout {
        future: Box::pin(future),
        sleep: sleep(after),
        after,
    }
}

/// Requires `future` to complete before `deadline`.
pub fn timeout_at<F: Future>(deadline: Instant, future: F) -> Timeout<F> {
    Timeout {
        future: Box::pin(future),
        sleep: sleep_until(deadline),
        after: deadline.saturating_duration_since(Instant::now()),
    }
}
